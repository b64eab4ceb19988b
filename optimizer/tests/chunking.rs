use rag_optimizer::pipeline::{ChunkConfig, Chunker, WordWindowChunker, chunk_text, normalize_text};

#[test]
fn five_words_size_three_overlap_one() -> anyhow::Result<()> {
    let chunks = chunk_text("one two three four five", 3, 1)?;
    assert_eq!(chunks, vec!["one two three", "three four five"]);
    Ok(())
}

#[test]
fn every_word_is_covered_and_window_count_is_bounded() -> anyhow::Result<()> {
    let words: Vec<String> = (0..137).map(|i| format!("w{i}")).collect();
    let text = words.join(" ");

    for (size, overlap) in [(1, 0), (5, 0), (5, 4), (10, 3), (200, 50)] {
        let chunks = WordWindowChunker.chunk(&text, &ChunkConfig::new(size, overlap))?;
        assert!(!chunks.is_empty());

        let step = size - overlap;
        let bound = words.len().div_ceil(step);
        assert!(
            chunks.len() <= bound,
            "size {size} overlap {overlap}: {} windows > {bound}",
            chunks.len()
        );

        for word in &words {
            assert!(
                chunks
                    .iter()
                    .any(|c| c.content.split(' ').any(|w| w == word)),
                "{word} missing for size {size} overlap {overlap}"
            );
        }
        assert!(chunks.iter().all(|c| c.word_count <= size));
    }
    Ok(())
}

#[test]
fn chunking_normalized_text_keeps_single_spaces() -> anyhow::Result<()> {
    let cleaned = normalize_text("  Policy\n\nline   two\tthree  ");
    assert_eq!(cleaned, "Policy line two three");
    assert_eq!(normalize_text(&cleaned), cleaned);

    let chunks = chunk_text(&cleaned, 500, 100)?;
    assert_eq!(chunks, vec!["Policy line two three"]);
    Ok(())
}

#[test]
fn hello_world_example() {
    assert_eq!(normalize_text("Hello   world!  "), "Hello world!");
}
