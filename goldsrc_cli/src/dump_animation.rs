use clap::Parser;

use goldsrc_mdl::Verified;

#[derive(Parser)]
pub struct DumpAnimation {
    #[clap(short, long)]
    sequence_name: Option<String>,
    #[clap(short, long)]
    names_only: bool,
    #[clap(short, long)]
    frame: Option<usize>,
    #[clap(short, long, default_value_t = 0)]
    blend: usize,
}

pub fn dump_animation(opts: &DumpAnimation, verified: &Verified) {
    for (sequence_index, sequence) in verified.sequences().unwrap().iter().enumerate() {
        if let Some(filter) = &opts.sequence_name {
            if sequence.name != filter {
                continue;
            }
        }

        if opts.names_only {
            eprintln!("{}", sequence.name);
            continue;
        }

        eprintln!("{:#?}", sequence);

        if let Some(frame_index) = opts.frame {
            match verified.bone_world_transforms(sequence_index, opts.blend, frame_index) {
                Ok(transforms) => {
                    for (bone_index, transform) in transforms.iter().enumerate() {
                        eprintln!("bone {}: {}", bone_index, transform);
                    }
                }
                Err(err) => eprintln!("Error computing bone transforms: {}", err),
            }
        }
    }
}
