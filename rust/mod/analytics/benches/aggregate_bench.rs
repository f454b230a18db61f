use std::collections::HashMap;

use chrono::{Duration, TimeZone, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;

use analytics::aggregate;
use analytics::model::{AccessRequest, Decision, GroupBy, PolicyEvaluationLog};

fn evaluation_logs(n: usize) -> Vec<PolicyEvaluationLog> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| PolicyEvaluationLog {
            id: format!("log-{i}"),
            policy_id: format!("policy-{}", i % 50),
            evaluation_time: (i % 97) as f64 * 0.75,
            final_decision: if i % 3 == 0 { Decision::Deny } else { Decision::Permit },
            user_id: Some(format!("user-{}", i % 200)),
            resource_type: Some("purchase_request".into()),
            created_at: base + Duration::minutes(i as i64),
        })
        .collect()
}

fn access_requests(n: usize) -> Vec<AccessRequest> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| AccessRequest {
            id: format!("req-{i}"),
            decision: if i % 4 == 0 { Decision::Deny } else { Decision::Permit },
            request_data: json!({
                "subject": {"userId": format!("user-{}", i % 200)},
                "resource": {"resourceType": "grn", "resourceId": format!("grn-{}", i % 500)},
                "action": {"actionType": "approve"}
            }),
            matched_policies: vec![format!("policy-{}", i % 50)],
            evaluation_time: Some(1.0),
            evaluation_result: None,
            ip_address: Some(format!("10.0.{}.{}", i % 4, i % 16)),
            created_at: base + Duration::minutes(i as i64),
        })
        .collect()
}

fn bench_performance_by_day(c: &mut Criterion) {
    let logs = evaluation_logs(10_000);
    let names: HashMap<String, String> = (0..50)
        .map(|i| (format!("policy-{i}"), format!("Policy {i}")))
        .collect();

    c.bench_function("performance_10k_by_day", |b| {
        b.iter(|| aggregate::performance(black_box(&logs), GroupBy::Day, &names, 5));
    });
}

fn bench_percentile(c: &mut Criterion) {
    let times: Vec<f64> = (0..10_000).map(|i| ((i * 7919) % 10_007) as f64).collect();
    c.bench_function("percentile_p99_10k", |b| {
        b.iter(|| aggregate::percentile(black_box(&times), 0.99));
    });
}

fn bench_usage_and_security(c: &mut Criterion) {
    let requests = access_requests(10_000);
    c.bench_function("usage_10k", |b| {
        b.iter(|| aggregate::usage(black_box(&requests), 10));
    });
    c.bench_function("security_10k", |b| {
        b.iter(|| aggregate::security(black_box(&requests), 10, 10));
    });
}

criterion_group!(benches, bench_performance_by_day, bench_percentile, bench_usage_and_security);
criterion_main!(benches);
