use deconvnet::NetError;
use deconvnet::backend::Backend;
use deconvnet::data::{
    DataIterator, Image, ImageCodec, Label, LabelKind, MnistIterator, PackIterator, RawCodec,
    next_batch, pack_list,
};
use deconvnet::nn::{Activation, DeconvParams, Filler, Net, NetConfig, Shape};
use std::path::{Path, PathBuf};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("deconvnet-{name}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_mnist(dir: &Path, images: u32, labels: u32, side: u32) -> (PathBuf, PathBuf) {
    let mut img = Vec::new();
    for v in [2051, images, side, side] {
        img.extend_from_slice(&u32::to_be_bytes(v));
    }
    img.extend((0..images * side * side).map(|i| (i * 13 % 256) as u8));

    let mut lab = Vec::new();
    for v in [2049, labels] {
        lab.extend_from_slice(&u32::to_be_bytes(v));
    }
    lab.extend((0..labels).map(|i| (i % 10) as u8));

    let (img_path, lab_path) = (dir.join("images.idx"), dir.join("labels.idx"));
    std::fs::write(&img_path, img).unwrap();
    std::fs::write(&lab_path, lab).unwrap();
    (img_path, lab_path)
}

#[test]
fn test_mnist_count_mismatch_fails_before_reading() {
    let dir = scratch_dir("mnist-mismatch");
    let (images, labels) = write_mnist(&dir, 10, 9, 4);
    assert!(matches!(
        MnistIterator::open(&images, &labels),
        Err(NetError::InvalidData(_))
    ));
}

#[test]
fn test_mnist_batches_feed_a_net() {
    let dir = scratch_dir("mnist-batches");
    let (images, labels) = write_mnist(&dir, 5, 5, 4);
    let mut iter = MnistIterator::open(&images, &labels).unwrap();
    assert_eq!((iter.len(), iter.rows(), iter.cols()), (5, 4, 4));

    let mut net = Net::new(NetConfig {
        backend: Backend::Cpu,
        ..NetConfig::default()
    });
    net.set_input_shape(Shape::new(2, 1, 4, 4)).unwrap();
    net.add_deconvolutional_layer(
        DeconvParams::new(1, 2, 2, 0, Filler::Xavier, Activation::Logistic),
        "input",
        "up",
    )
    .unwrap();

    // three batches of two walk past the end of a five-sample file
    for _ in 0..3 {
        let (inputs, labels) = next_batch(&mut iter, 2).unwrap();
        assert_eq!(inputs.len(), 32);
        assert_eq!(labels.len(), 2);
        assert!(inputs.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(net.predict(&inputs).unwrap().len(), 2 * 8 * 8);
    }

    iter.rewind().unwrap();
    assert_eq!(iter.next_sample().unwrap().label, Label::Int(vec![0]));
}

#[test]
fn test_packed_list_round_trips_through_files() {
    let dir = scratch_dir("pack-files");
    let mut list = String::new();
    for i in 0..3u8 {
        let img = Image::new(vec![i * 10; 2 * 2 * 3], 2, 2, 3).unwrap();
        let path = dir.join(format!("{i}.raw"));
        std::fs::write(&path, RawCodec.encode(&img).unwrap()).unwrap();
        list.push_str(&format!("{} {i}\n", path.display()));
    }
    let list_path = dir.join("train.lst");
    std::fs::write(&list_path, list).unwrap();
    let pack_path = dir.join("train.pack");

    let written = pack_list(&list_path, 1, LabelKind::Int, &RawCodec, &pack_path).unwrap();
    assert_eq!(written, 3);

    let mut iter = PackIterator::open(&pack_path, RawCodec).unwrap();
    assert_eq!(iter.label_kind(), LabelKind::Int);
    let labels: Vec<Label> = (0..4).map(|_| iter.next_sample().unwrap().label).collect();
    assert_eq!(
        labels,
        [0, 1, 2, 0].map(|i| Label::Int(vec![i])).to_vec()
    );
}
