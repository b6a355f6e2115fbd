#![warn(clippy::all, clippy::pedantic)]

mod dump_animation;

use dump_animation::{dump_animation, DumpAnimation};

use goldsrc_mdl::{Model, Verified};

use clap::Parser;

#[derive(Parser)]
#[clap(version = "0.1.0")]
struct Opts {
    #[clap(short, long)]
    mdl_path: String,
    #[clap(subcommand)]
    subcommand: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    Info,
    DumpBones,
    DumpAnimation(DumpAnimation),
}

fn main() {
    let opts = Opts::parse();

    let model = Model::read(&opts.mdl_path).unwrap();
    let verified = model.verify().unwrap();

    match opts.subcommand {
        SubCommand::Info => info(&verified),
        SubCommand::DumpBones => dump_bones(&verified),
        SubCommand::DumpAnimation(opts) => dump_animation(&opts, &verified),
    }
}

fn info(verified: &Verified) {
    eprintln!("name: {}", verified.name().unwrap());
    eprintln!("eye position: {}", verified.eye_position());
    eprintln!("bones: {}", verified.bones().unwrap().len());

    for texture in verified.textures().unwrap() {
        eprintln!(
            "texture: {} ({}x{}, {:?})",
            texture.name, texture.data.width, texture.data.height, texture.flags,
        );
    }

    for body_part in verified.body_parts().unwrap() {
        eprintln!("body part: {} ({} models)", body_part.name, body_part.models.len());
    }

    for sequence in verified.sequences().unwrap() {
        eprintln!(
            "sequence: {} ({} frames, {} fps)",
            sequence.name, sequence.frame_count, sequence.fps,
        );
    }
}

fn dump_bones(verified: &Verified) {
    for bone in verified.bones().unwrap() {
        eprintln!("{:#?}", bone);
    }
}
