use jointnlu_core::parser::{AnnotationParser, Corpus, DEFAULT_MAX_LEN, HfTokenizer, spans_from_tags};
use jointnlu_core::supervision::SupervisionEncoder;
use jointnlu_core::vocab::LabelVocabulary;

const CORPUS: &str = r#"
version: "3.1"
nlu:
  - intent: car/navigate
    examples: |
      - 导航去[新浪总部](location)
      - 带我去[公司](location)
      - 回家
  - intent: car/play_music
    examples: |
      - 放一首[周杰伦](singer)的[晴天](song)
  - synonym: 公司
    examples: |
      - 单位
"#;

fn tokenizer() -> HfTokenizer {
    HfTokenizer::from_tokens(
        ["[PAD]", "[UNK]", "[CLS]", "[SEP]"]
            .into_iter()
            .map(String::from)
            .chain("导航去新浪总部带我公司回家放一首周杰伦的晴天".chars().map(String::from)),
        DEFAULT_MAX_LEN,
    )
    .unwrap()
}

#[test]
fn corpus_to_batch() {
    let corpus = Corpus::from_yaml_str(CORPUS).unwrap();
    let parser = AnnotationParser::new().unwrap();
    let examples = corpus.parse_examples(&parser);
    assert_eq!(examples.len(), 4);
    assert_eq!(examples[0].text, "导航去新浪总部");
    assert_eq!(examples[0].spans[0].surface(&examples[0].text), Some("新浪总部"));

    let vocab = LabelVocabulary::from_corpus(&corpus).unwrap();
    assert_eq!(vocab.intents(), ["navigate", "play_music"]);
    assert_eq!(vocab.entity_types(), ["location", "singer", "song"]);
    assert_eq!(vocab, LabelVocabulary::from_corpus(&corpus).unwrap());

    let tokenizer = tokenizer();
    let encoder = SupervisionEncoder::new(&tokenizer, &vocab);
    let batch = encoder.encode_batch(&examples).unwrap();
    assert_eq!(batch.dropped_spans, 0);

    for example in &batch.examples {
        let decoded: Vec<(usize, usize)> = spans_from_tags(&example.tags)
            .into_iter()
            .map(|b| (b.start, b.end))
            .collect();
        let gold: Vec<(usize, usize)> = example.spans.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(decoded, gold);
    }

    let music = &batch.examples[3];
    let types: Vec<u32> = music.spans.iter().map(|s| s.type_id).collect();
    assert_eq!(types, vec![2, 3]);
    assert_eq!(music.intent_id, 1);

    let tensors = batch.to_tensors(&candle_core::Device::Cpu).unwrap();
    assert_eq!(tensors.spans.dims(), &[4, 2, 2]);
    assert_eq!(tensors.span_types.to_vec2::<u32>().unwrap()[2], vec![0, 0]);
}
