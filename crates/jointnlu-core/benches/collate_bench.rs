use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jointnlu_core::parser::{AnnotationParser, DEFAULT_MAX_LEN, HfTokenizer};
use jointnlu_core::supervision::SupervisionEncoder;
use jointnlu_core::vocab::LabelVocabulary;

fn bench_parse_and_collate(c: &mut Criterion) {
    let parser = AnnotationParser::new().unwrap();
    let tokenizer = HfTokenizer::from_tokens(
        ["[PAD]", "[UNK]", "[CLS]", "[SEP]"]
            .into_iter()
            .map(String::from)
            .chain("导航去新浪总部北京天安门我要回家放一首周杰伦的歌".chars().map(String::from)),
        DEFAULT_MAX_LEN,
    )
    .unwrap();
    let vocab = LabelVocabulary::from_labels(["navigate", "play_music"], ["location", "singer"]);

    let inputs = vec![
        ("导航去[新浪总部](location)", "navigate"),
        ("我要去[北京天安门](location)", "navigate"),
        ("导航回家", "navigate"),
        ("放一首[周杰伦](singer)的歌", "play_music"),
    ];

    c.bench_function("annotation_parse_single", |b| {
        b.iter(|| parser.parse(black_box(inputs[0].0), inputs[0].1));
    });

    let examples: Vec<_> = inputs
        .iter()
        .cycle()
        .take(16)
        .map(|(raw, intent)| parser.parse(raw, intent))
        .collect();
    let encoder = SupervisionEncoder::new(&tokenizer, &vocab);

    c.bench_function("collate_batch_16", |b| {
        b.iter(|| encoder.encode_batch(black_box(&examples)).unwrap());
    });
}

criterion_group!(benches, bench_parse_and_collate);
criterion_main!(benches);
