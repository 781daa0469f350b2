//! Token hot paths: minting, stateless authentication, scope checks, and
//! a full gate verification including the revocation lookup.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use vaultgate_core::codec::encode;
use vaultgate_core::{AgentId, Holder, Keypair, RequiredScope, Scope, Tier, TokenCodec, UserId};
use vaultgate_testkit::{TestGate, TEST_EPOCH};

fn codec() -> TokenCodec {
    TokenCodec::new("vaultgate", Keypair::from_seed(&[7; 32]))
}

fn bench_mint(c: &mut Criterion) {
    let codec = codec();
    let user = UserId::new("u1").unwrap();
    let holder = Holder::Agent(AgentId::new("a1").unwrap());

    c.bench_function("token_mint_encode", |b| {
        b.iter(|| {
            let token = codec
                .mint(
                    &user,
                    holder.clone(),
                    Tier::Consent,
                    black_box("attr.food.*"),
                    Duration::from_secs(3600),
                    TEST_EPOCH,
                )
                .unwrap();
            encode(&token).unwrap()
        })
    });
}

fn bench_authenticate(c: &mut Criterion) {
    let codec = codec();
    let token = codec
        .mint(
            &UserId::new("u1").unwrap(),
            Holder::Agent(AgentId::new("a1").unwrap()),
            Tier::Consent,
            "attr.food.*",
            Duration::from_secs(3600),
            TEST_EPOCH,
        )
        .unwrap();
    let encoded = encode(&token).unwrap();

    c.bench_function("token_authenticate", |b| {
        b.iter(|| codec.authenticate(black_box(&encoded), TEST_EPOCH + 1))
    });
}

fn bench_scope(c: &mut Criterion) {
    let mut group = c.benchmark_group("scope_satisfies");
    for depth in [2usize, 4, 8] {
        let prefix: Vec<String> = (0..depth).map(|i| format!("s{i}")).collect();
        let granted = Scope::parse(&format!("{}.*", prefix.join("."))).unwrap();
        let required = RequiredScope::parse(&format!("{}.leaf", prefix.join("."))).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| black_box(&granted).satisfies(black_box(&required)))
        });
    }
    group.finish();
}

fn bench_gate_verify(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let t = TestGate::new();
    let grant = rt.block_on(t.grant("u1", "a1", "attr.food.*", Duration::from_secs(3600)));

    c.bench_function("gate_verify_with_revocation_check", |b| {
        b.iter(|| {
            rt.block_on(t.gate.verify(black_box(grant.encoded()), Some("attr.food.diet")))
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_mint,
    bench_authenticate,
    bench_scope,
    bench_gate_verify
);
criterion_main!(benches);
