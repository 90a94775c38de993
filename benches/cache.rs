use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use esindex::cache::{CacheBudget, CacheManager};
use esindex::config::IndexConfig;
use esindex::crypto::{ContentCipher, Sealed};
use esindex::index::IndexStore;
use esindex::model::{DecryptedContent, MessageMetadata, Recipient, UserId};
use esindex::search::query::parse_query;
use esindex::state::IndexStates;

const MESSAGES: i64 = 2_000;

struct Xor;

impl ContentCipher for Xor {
    fn seal(&self, plaintext: &[u8]) -> esindex::Result<Sealed> {
        Ok(Sealed {
            nonce: vec![0x33; 8],
            ciphertext: plaintext.iter().map(|b| b ^ 0x33).collect(),
        })
    }

    fn open(&self, _nonce: &[u8], ciphertext: &[u8]) -> esindex::Result<Vec<u8>> {
        Ok(ciphertext.iter().map(|b| b ^ 0x33).collect())
    }
}

fn populated_store(dir: &std::path::Path, user: &UserId) -> Arc<IndexStore> {
    let store = Arc::new(IndexStore::new(
        dir,
        IndexConfig::default(),
        Arc::new(IndexStates::new()),
        Arc::new(Xor),
    ));
    store.states().enable(user).unwrap();
    for i in 0..MESSAGES {
        let content = DecryptedContent {
            subject: format!("Weekly update #{i}"),
            sender: Recipient::new("Alice", "alice@example.com"),
            body: "Status is green. Next steps are in the attached plan. ".repeat(20),
            ..Default::default()
        };
        store
            .insert(
                user,
                &MessageMetadata::new(format!("m{i}"), 1_600_000_000 + i * 60, 0),
                Some(&content),
            )
            .unwrap();
    }
    store
}

fn bench_cache_build(c: &mut Criterion) {
    let tmp = tempfile::tempdir().unwrap();
    let user = UserId::from("bench");
    let store = populated_store(tmp.path(), &user);

    c.bench_function("build_cache_2000", |b| {
        b.iter(|| {
            let cache = CacheManager::new(store.clone(), CacheBudget::new(u64::MAX, 500));
            cache.build_blocking(&user, 500).unwrap()
        })
    });
}

fn bench_cache_scan(c: &mut Criterion) {
    let tmp = tempfile::tempdir().unwrap();
    let user = UserId::from("bench");
    let store = populated_store(tmp.path(), &user);
    let cache = CacheManager::new(store, CacheBudget::new(u64::MAX, 500));
    cache.build_blocking(&user, 500).unwrap();
    let query = parse_query("subject:update -body:red");

    c.bench_function("contains_lookup", |b| {
        b.iter(|| (0..MESSAGES).filter(|i| cache.contains(&user, &format!("m{i}"))).count())
    });
    c.bench_function("scan_cached_matches", |b| {
        b.iter(|| {
            let mut hits = 0;
            cache.scan_newest_first(&user, |m| {
                if esindex::search::matcher::matches(m, &query) {
                    hits += 1;
                }
                true
            });
            hits
        })
    });
}

criterion_group!(benches, bench_cache_build, bench_cache_scan);
criterion_main!(benches);
