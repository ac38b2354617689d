use std::path::Path;

use brreskit::prelude::*;
use brreskit::geometry::IndexFormat;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Encodes PNG size only, so tests run without the real texture tool.
struct SizeOnlyConverter;

impl ImageConverter for SizeOnlyConverter {
    fn name(&self) -> &str {
        "size-only"
    }

    fn encode(&mut self, image: &Path, format: TextureFormat, mipmaps: Option<u32>) -> Result<Texture> {
        let decoded = image::open(image)?;
        Ok(Texture::blank(
            "encoded",
            u16::try_from(decoded.width()).unwrap(),
            u16::try_from(decoded.height()).unwrap(),
            format,
            mipmaps.unwrap_or(0),
        ))
    }

    fn decode(&mut self, texture: &Texture, dest: &Path) -> Result<()> {
        image::RgbaImage::new(u32::from(texture.width), u32::from(texture.height))
            .save_with_format(dest, image::ImageFormat::Png)?;
        Ok(())
    }
}

fn size_only_codec() -> Codec {
    Codec::new(CodecOptions::default()).with_converter(ConverterHandle::new(SizeOnlyConverter))
}

/// Counter-clockwise triangles of a ribbon over vertices 0..n+2.
fn ribbon_faces(n: u32) -> Vec<[u32; 3]> {
    (0..n)
        .map(|k| if k % 2 == 0 { [k, k + 2, k + 1] } else { [k + 1, k + 2, k] })
        .collect()
}

fn ribbon_points(n: u32) -> Vec<[f32; 3]> {
    (0..n + 2).map(|i| [(i / 2) as f32, (i % 2) as f32, 0.0]).collect()
}

fn line_points(count: usize) -> Vec<[f32; 3]> {
    (0..count).map(|i| [i as f32, 0.0, 1.0]).collect()
}

/// (tag, facepoint count) of the first draw command.
fn first_command(polygon: &Polygon) -> (u8, u16) {
    let bytes = &polygon.draw.bytes;
    (bytes[0], u16::from_be_bytes([bytes[1], bytes[2]]))
}

fn sample_container() -> Container {
    let codec = size_only_codec();
    let mut container = Container::new("course");

    let mut model = Model::new("map");
    let root = model.skeleton.add_bone("root", None).unwrap();
    model.skeleton.add_bone("flag", Some(root)).unwrap();

    let n = 6;
    let faces = ribbon_faces(n);
    let vertices = PointCollection::from_points(&ribbon_points(n), faces.clone()).unwrap();
    let normals = PointCollection::from_points(&[[0.0f32, 0.0, 1.0]], vec![[0, 0, 0]; faces.len()]).unwrap();
    let colors = ColorCollection::new(
        vec![[255, 0, 0, 255], [0, 255, 0, 128]],
        faces.iter().map(|f| f.map(|i| i % 2)).collect(),
        ColorFormat::Rgba8,
    )
    .unwrap();
    let uvs = PointCollection::from_points(
        &ribbon_points(n).iter().map(|p| [p[0] / 4.0, p[1]]).collect::<Vec<_>>(),
        faces,
    )
    .unwrap();
    let geometry = Geometry::new("road", vertices)
        .with_normals(normals)
        .with_colors(colors)
        .with_uvs(uvs)
        .with_bone(1);
    codec.add_geometry(&mut model, &geometry).unwrap();
    container.insert_model(model).unwrap();

    codec
        .add_texture(&mut container, Texture::blank("asphalt", 32, 32, TextureFormat::Cmpr, 1))
        .unwrap();
    container
}

#[test]
fn test_container_round_trip() {
    init_tracing();
    let container = sample_container();
    let bytes = encode_container(&container).unwrap();
    let decoded = decode_container(&bytes).unwrap();
    assert_eq!(decoded.models, container.models);
    assert_eq!(decoded.textures, container.textures);

    // a second pass is byte-identical
    assert_eq!(encode_container(&decoded).unwrap(), bytes);
}

#[test]
fn test_read_write_file() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("course.brres");
    let container = sample_container();
    write_container(&path, &container).unwrap();

    let read = read_container(&path).unwrap();
    assert_eq!(read.name, "course");
    assert_eq!(read, container);
}

#[test]
fn test_decoded_geometry_within_quantization_error() {
    init_tracing();
    let points: Vec<[f32; 3]> = (0..12)
        .map(|i| {
            let t = i as f32 * 0.37;
            [t.sin() * 3.5, t.cos() * -1.25, t * 0.1]
        })
        .collect();
    let faces: Vec<[u32; 3]> = (0..10).map(|i| [i, i + 1, i + 2]).collect();
    let vertices = PointCollection::from_points(&points, faces).unwrap();

    let mut model = Model::new("kart");
    let codec = size_only_codec();
    let added = codec.add_geometry(&mut model, &Geometry::new("body", vertices.clone())).unwrap();
    let group = &model.vertices[model.polygons[added.polygon].vertex.group as usize];
    let tolerance = if group.divisor == 0 {
        0.0
    } else {
        1.0 / f32::from(1u16 << group.divisor)
    };

    let decoded = codec.decode_polygon(&model, added.polygon).unwrap();
    assert_eq!(decoded.vertices.len(), vertices.len());
    for (original, restored) in vertices.iter().zip(decoded.vertices.iter()) {
        for (a, b) in original.iter().zip(restored) {
            assert!((a - b).abs() <= tolerance, "{a} decoded as {b}");
        }
    }
    // every triangle survives, reindexed into the decoded table
    assert_eq!(decoded.vertices.faces().len(), 10);
}

#[test]
fn test_duplicate_points_are_merged() {
    let vertices = PointCollection::from_points(
        &[[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [-0.0, 0.0, 0.0]],
        vec![[0, 1, 2], [4, 3, 2]],
    )
    .unwrap();
    let mut model = Model::new("kart");
    model.add_geometry(&Geometry::new("body", vertices), &CodecOptions::default()).unwrap();
    assert_eq!(model.vertices[0].count, 3);
}

#[test]
fn test_ribbon_is_one_strip() {
    let n = 6;
    let vertices = PointCollection::from_points(&ribbon_points(n), ribbon_faces(n)).unwrap();
    let mut model = Model::new("kart");
    model.add_geometry(&Geometry::new("ribbon", vertices), &CodecOptions::default()).unwrap();
    let polygon = &model.polygons[0];
    assert_eq!(first_command(polygon), (0x98, 8));
    assert_eq!(polygon.facepoint_count(), 8);
    assert_eq!(polygon.face_count(), 6);
}

#[test]
fn test_disconnected_triangles_form_one_list() {
    let points = line_points(15);
    let faces: Vec<[u32; 3]> = (0..5).map(|i| [i * 3, i * 3 + 1, i * 3 + 2]).collect();
    let vertices = PointCollection::from_points(&points, faces).unwrap();
    let mut model = Model::new("kart");
    model.add_geometry(&Geometry::new("shards", vertices), &CodecOptions::default()).unwrap();
    let polygon = &model.polygons[0];
    assert_eq!(first_command(polygon), (0x90, 15));
    // the list is the only command before the padding
    assert_eq!(polygon.draw.bytes[3 + 15], 0x00);
}

#[test]
fn test_index_width_boundary() {
    let mut model = Model::new("kart");
    let byte = PointCollection::from_points(&line_points(255), vec![[0, 1, 254]]).unwrap();
    let added = model.add_geometry(&Geometry::new("small", byte), &CodecOptions::default()).unwrap();
    assert!(added.fixups.is_empty());
    assert_eq!(model.polygons[0].vertex.index_format, IndexFormat::Byte);

    let short = PointCollection::from_points(&line_points(256), vec![[0, 1, 255]]).unwrap();
    let added = model.add_geometry(&Geometry::new("large", short), &CodecOptions::default()).unwrap();
    assert_eq!(added.fixups.len(), 1);
    assert_eq!(
        added.fixups[0].kind,
        FixupKind::ShortIndices {
            attribute: "vertex",
            count: 256
        }
    );
    assert_eq!(model.polygons[1].vertex.index_format, IndexFormat::Short);
}

#[test]
fn test_degenerate_triangles_dropped() {
    let vertices = PointCollection::from_points(&line_points(4), vec![[0, 1, 2], [3, 3, 1], [2, 2, 2]]).unwrap();
    let mut model = Model::new("kart");
    model.add_geometry(&Geometry::new("body", vertices), &CodecOptions::default()).unwrap();
    assert_eq!(model.polygons[0].face_count(), 1);
    assert_eq!(model.info.face_count, 1);
}

#[test]
fn test_non_power_of_two_texture_fixup() {
    init_tracing();
    let codec = size_only_codec();
    let mut container = Container::new("course");
    let fixups = codec
        .add_texture(&mut container, Texture::blank("road", 100, 50, TextureFormat::Cmpr, 0))
        .unwrap();

    assert_eq!(fixups.len(), 1);
    assert!(fixups[0].resolved);
    assert_eq!(fixups[0].to_string(), "road: 100x50 is not a power of two, resized to 128x64");
    let texture = container.texture("road").unwrap();
    assert_eq!((texture.width, texture.height), (128, 64));
}

#[test]
fn test_partial_decode_keeps_good_subfiles() {
    let container = sample_container();
    let mut bytes = encode_container(&container).unwrap();
    // break the texture's format field
    let tex0 = bytes.windows(4).rposition(|w| w == b"TEX0").unwrap();
    bytes[tex0 + 0x18 + 0x0B] = 0x07;

    assert!(decode_container(&bytes).is_err());
    let (partial, errors) = decode_container_partial(&bytes).unwrap();
    assert_eq!(partial.models, container.models);
    assert!(partial.textures.is_empty());
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("asphalt"));
}
