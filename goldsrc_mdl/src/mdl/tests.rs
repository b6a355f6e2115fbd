use std::f32::consts::FRAC_PI_2;

use approx::assert_relative_eq;

use super::*;

fn quat_to_euler(q: Quat) -> Vec3 {
    let (z, y, x) = q.to_euler(EulerRot::ZYX);
    Vec3::new(x, y, z)
}

/// Tests that euler to quat conversion is identical to Blender
#[test]
fn euler_to_quat_conversion_blender_compatible() {
    assert_relative_eq!(
        euler_to_quat(Vec3::new(1.442_919_9, -0.457_030_3, 0.202_343_17)),
        Quat::from_xyzw(0.657_201, -0.104_246, 0.222_718, 0.712_472),
        epsilon = 0.01,
    );

    assert_relative_eq!(
        euler_to_quat(Vec3::new(1.570_796_1, 0.0, -1.570_776_7)),
        Quat::from_xyzw(0.500_005, -0.499_995, -0.499_995, 0.500_005),
        epsilon = 0.01,
    );
}

#[test]
fn quat_euler_conversion_consistency() {
    let original = Quat::from_xyzw(0.657_201, -0.104_246, 0.222_718, 0.712_472);
    let converted = euler_to_quat(quat_to_euler(original));

    assert_relative_eq!(original, converted);
}

#[test]
fn local_transform_rotates_before_translating() {
    let transform = local_transform(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 0.0, FRAC_PI_2));

    assert_relative_eq!(
        transform.transform_point3(Vec3::ZERO),
        Vec3::new(1.0, 2.0, 3.0),
        epsilon = 0.0001,
    );

    // a 90 degree z rotation maps +x to +y
    assert_relative_eq!(
        transform.transform_point3(Vec3::X),
        Vec3::new(1.0, 3.0, 3.0),
        epsilon = 0.0001,
    );
}

#[test]
fn animation_value_repeats_last_sample() {
    let values = [
        AnimValue::from_span(3, 5),
        AnimValue::from_value(10),
        AnimValue::from_value(20),
        AnimValue::from_value(30),
    ];

    assert_relative_eq!(
        extract_animation_value(0, &values, 2.0, 1.0).unwrap(),
        21.0
    );
    assert_relative_eq!(
        extract_animation_value(2, &values, 2.0, 1.0).unwrap(),
        61.0
    );
    // frames past the valid samples repeat the last one
    assert_relative_eq!(
        extract_animation_value(3, &values, 2.0, 1.0).unwrap(),
        61.0
    );
    assert_relative_eq!(
        extract_animation_value(4, &values, 2.0, 1.0).unwrap(),
        61.0
    );
}

#[test]
fn animation_value_fully_sampled_span() {
    let values = [
        AnimValue::from_span(2, 2),
        AnimValue::from_value(5),
        AnimValue::from_value(-3),
    ];

    assert_relative_eq!(
        extract_animation_value(1, &values, 1.0, 0.0).unwrap(),
        -3.0
    );
}

#[test]
fn animation_value_header_doubles_as_sample() {
    // with no stored samples the span header itself is read back as the value
    let values = [AnimValue::from_span(0, 4)];
    let expected = f32::from(values[0].value());

    for frame_index in 0..4 {
        assert_relative_eq!(
            extract_animation_value(frame_index, &values, 1.0, 0.0).unwrap(),
            expected
        );
    }
}

#[test]
fn animation_value_spans_multiple_runs() {
    let values = [
        AnimValue::from_span(1, 2),
        AnimValue::from_value(100),
        AnimValue::from_span(1, 1),
        AnimValue::from_value(7),
    ];

    assert_relative_eq!(
        extract_animation_value(1, &values, 1.0, 0.0).unwrap(),
        100.0
    );
    assert_relative_eq!(extract_animation_value(2, &values, 1.0, 0.0).unwrap(), 7.0);
}

#[test]
fn animation_value_zero_length_span_fails() {
    let values = [AnimValue::from_span(1, 0), AnimValue::from_value(1)];

    assert_eq!(
        extract_animation_value(0, &values, 1.0, 0.0),
        Err(Error::CorruptAnimation {
            error: "zero-length span in value stream",
        })
    );
}

#[test]
fn animation_value_exhausted_stream_fails() {
    let values = [AnimValue::from_span(1, 2), AnimValue::from_value(100)];

    assert_eq!(
        extract_animation_value(5, &values, 1.0, 0.0),
        Err(Error::CorruptAnimation {
            error: "value stream ended before the target frame",
        })
    );
}

#[test]
fn animation_value_span_missing_samples_fails() {
    let values = [AnimValue::from_span(2, 3), AnimValue::from_value(10)];

    assert_eq!(
        extract_animation_value(1, &values, 1.0, 0.0),
        Err(Error::CorruptAnimation {
            error: "value stream ended inside a span",
        })
    );
}

#[test]
fn texture_decode_flips_rows_and_expands_palette() {
    let texture = Texture {
        name: [0; 64],
        flags: 0,
        width: 2,
        height: 2,
        data_offset: 0,
    };

    // 4 palette indices followed by the 256 color palette
    let mut bytes = vec![0u8, 1, 2, 3];
    let mut palette = [0u8; PALETTE_LEN];
    palette[3..6].copy_from_slice(&[255, 0, 0]);
    palette[6..9].copy_from_slice(&[0, 255, 0]);
    palette[9..12].copy_from_slice(&[0, 0, 255]);
    bytes.extend_from_slice(&palette);

    let data = TextureRef {
        texture: &texture,
        bytes: &bytes,
    }
    .decode()
    .unwrap();

    assert_eq!(data.width, 2);
    assert_eq!(data.height, 2);

    // the bottom row (green, blue) comes out first
    assert_eq!(
        data.rgba,
        vec![
            0.0, 1.0, 0.0, 1.0, //
            0.0, 0.0, 1.0, 1.0, //
            0.0, 0.0, 0.0, 1.0, //
            1.0, 0.0, 0.0, 1.0, //
        ]
    );
}

#[test]
fn texture_decode_out_of_bounds_fails() {
    let texture = Texture {
        name: [0; 64],
        flags: 0,
        width: 16,
        height: 16,
        data_offset: 0,
    };

    assert_eq!(
        TextureRef {
            texture: &texture,
            bytes: &[0; 16],
        }
        .decode(),
        Err(Error::Truncated {
            error: "texture pixel data out of bounds",
        })
    );
}

fn push_face_vertices(bytes: &mut Vec<u8>, count: i16) {
    bytes.extend_from_slice(&count.to_le_bytes());

    for i in 0..count.unsigned_abs() {
        bytes.extend_from_slice(&i.to_le_bytes());
        bytes.extend_from_slice(&i.to_le_bytes());
        bytes.extend_from_slice(&(i * 10).to_le_bytes());
        bytes.extend_from_slice(&(i * 20).to_le_bytes());
    }
}

#[test]
fn face_stream_decodes_strips_and_fans() {
    let mesh = Mesh {
        face_count: 2,
        face_offset: 0,
        skin_index: 0,
        normal_count: 0,
        normal_offset: 0,
    };

    let mut bytes = Vec::new();
    push_face_vertices(&mut bytes, 4);
    push_face_vertices(&mut bytes, -3);
    bytes.extend_from_slice(&0i16.to_le_bytes());

    let faces = MeshRef {
        mesh: &mesh,
        bytes: &bytes,
    }
    .faces()
    .unwrap();

    assert_eq!(faces.len(), 2);

    assert_eq!(faces[0].primitive_type, PrimitiveType::TriangleStrip);
    assert_eq!(faces[0].vertices.len(), 4);
    assert_eq!(faces[0].vertices[2].vertex_index.get(), 2);
    assert_eq!(faces[0].vertices[2].u.get(), 20);
    assert_eq!(faces[0].vertices[2].v.get(), 40);

    assert_eq!(faces[1].primitive_type, PrimitiveType::TriangleFan);
    assert_eq!(faces[1].vertices.len(), 3);
}

#[test]
fn face_stream_without_terminator_fails() {
    let mesh = Mesh {
        face_count: 1,
        face_offset: 0,
        skin_index: 0,
        normal_count: 0,
        normal_offset: 0,
    };

    let mut bytes = Vec::new();
    push_face_vertices(&mut bytes, 3);

    assert_eq!(
        MeshRef {
            mesh: &mesh,
            bytes: &bytes,
        }
        .faces(),
        Err(Error::Truncated {
            error: "eof reading face vertex count",
        })
    );
}

#[test]
fn face_stream_truncated_vertices_fail() {
    let mesh = Mesh {
        face_count: 1,
        face_offset: 0,
        skin_index: 0,
        normal_count: 0,
        normal_offset: 0,
    };

    let mut bytes = Vec::new();
    push_face_vertices(&mut bytes, 3);
    bytes.truncate(10);

    assert_eq!(
        MeshRef {
            mesh: &mesh,
            bytes: &bytes,
        }
        .faces(),
        Err(Error::Truncated {
            error: "eof reading face vertices",
        })
    );
}

#[test]
fn names_are_read_up_to_the_first_null() {
    let mut name = [0; 32];
    name[..4].copy_from_slice(b"idle");

    assert_eq!(name_str(&name, "err").unwrap(), "idle");

    let mut garbage_after_null = name;
    garbage_after_null[6] = 0xff;

    assert_eq!(name_str(&garbage_after_null, "err").unwrap(), "idle");

    let invalid = [0xff; 32];

    assert_eq!(
        name_str(&invalid, "err"),
        Err(Error::Corrupted { error: "err" })
    );
}

#[test]
fn invalid_signature_is_detected() {
    let mdl = Mdl::from_bytes(b"IDSQ\x0a\x00\x00\x00".to_vec());

    assert_eq!(
        mdl.check_signature(),
        Err(Error::InvalidSignature {
            signature: "IDSQ".to_owned(),
        })
    );
}

#[test]
fn unsupported_version_is_detected() {
    let mdl = Mdl::from_bytes(b"IDST\x06\x00\x00\x00".to_vec());

    assert!(mdl.check_signature().is_ok());
    assert_eq!(
        mdl.check_version(),
        Err(Error::UnsupportedVersion { version: 6 })
    );
}

#[test]
fn header_of_truncated_file_fails() {
    let mdl = Mdl::from_bytes(b"IDST\x0a\x00\x00\x00".to_vec());

    assert!(matches!(mdl.header(), Err(Error::Truncated { .. })));
}
