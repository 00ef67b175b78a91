use lore_core::knowledge::{IndexParams, KnowledgeError, VectorIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

const DIM: usize = 32;

fn random_vectors(n: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..DIM).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (na * nb)
}

fn exact_top_k(vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<u32> {
    let mut scored: Vec<(u32, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (i as u32, cosine(v, query)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.into_iter().take(k).map(|(i, _)| i).collect()
}

#[test]
fn test_recall_against_exact_search() {
    let vectors = random_vectors(600, 7);
    let queries = random_vectors(30, 99);
    let mut index = VectorIndex::new(IndexParams::default());
    index.build(&vectors).unwrap();

    let k = 10;
    let mut found = 0;
    for query in &queries {
        let truth = exact_top_k(&vectors, query, k);
        let got: Vec<u32> = index.query(query, k).unwrap().into_iter().map(|(id, _)| id).collect();
        found += got.iter().filter(|id| truth.contains(id)).count();
    }

    let recall = found as f32 / (queries.len() * k) as f32;
    assert!(recall >= 0.8, "recall@10 was {}", recall);
}

#[test]
fn test_mapped_index_answers_like_built_index() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("vectors").join("code.lvix");
    let vectors = random_vectors(250, 3);

    let mut built = VectorIndex::new(IndexParams::default());
    built.set_model_id("test-model");
    built.build(&vectors).unwrap();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    built.save(&path).unwrap();

    let mapped = VectorIndex::open(&path, IndexParams::default()).unwrap();
    assert_eq!(mapped.len(), 250);
    assert_eq!(mapped.dimension(), Some(DIM));
    assert!(mapped.matches_model("test-model"));
    assert!(!mapped.matches_model("other-model"));

    for query in random_vectors(10, 42) {
        assert_eq!(built.query(&query, 5).unwrap(), mapped.query(&query, 5).unwrap());
    }
}

#[test]
fn test_every_vector_is_its_own_top_hit_after_reload() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("gamedata.lvix");
    let vectors = random_vectors(300, 21);

    let mut built = VectorIndex::new(IndexParams::default());
    built.build(&vectors).unwrap();
    built.save(&path).unwrap();
    drop(built);

    let loaded = VectorIndex::open(&path, IndexParams::default()).unwrap();
    assert_eq!(loaded.len(), vectors.len());
    for (i, vector) in vectors.iter().enumerate() {
        let hits = loaded.query(vector, 1).unwrap();
        assert_eq!(hits[0].0, i as u32, "slot {} did not find itself", i);
        assert!(hits[0].1 > 0.999, "self score for slot {} was {}", i, hits[0].1);
    }
}

#[test]
fn test_reload_after_close() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("docs.lvix");
    let vectors = random_vectors(50, 11);

    let mut index = VectorIndex::new(IndexParams::default());
    index.build(&vectors).unwrap();
    index.save(&path).unwrap();

    let mut index = VectorIndex::open(&path, IndexParams::default()).unwrap();
    index.close();
    assert!(matches!(index.query(&vectors[0], 1), Err(KnowledgeError::IndexNotLoaded)));

    index.load(&path).unwrap();
    let hits = index.query(&vectors[0], 1).unwrap();
    assert_eq!(hits[0].0, 0);
}

#[test]
fn test_truncated_file_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("client.lvix");

    let mut index = VectorIndex::new(IndexParams::default());
    index.build(&random_vectors(20, 5)).unwrap();
    index.save(&path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 7]).unwrap();

    assert!(matches!(
        VectorIndex::open(&path, IndexParams::default()),
        Err(KnowledgeError::Index(_))
    ));
}
