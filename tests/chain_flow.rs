//! End-to-end chain execution against a scripted transaction client.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chainrunner::{
    ApiRequest, ApiResponse, BatchOptions, ChainDefinition, ChainOrchestrator, ChainStateStore,
    ChainStatus, ChainStep, ConcurrencyScheduler, ConversionManager, HttpMethod, OperationCatalog,
    OperationKind, StepFailure, TagFilter, TransactionClient,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Scripted stand-in for the acquiring API. Successful creates hand out
/// sequential payment/refund ids; failure behavior is injected per test.
#[derive(Default)]
struct MockGateway {
    requests: Mutex<Vec<ApiRequest>>,
    payment_seq: AtomicU32,
    refund_seq: AtomicU32,
    /// Requests whose path ends with this suffix fail with HTTP 500.
    fail_path_suffix: Option<String>,
    fail_rate_inquiry: bool,
    /// Random sub-5ms delay per call to shake out interleavings.
    jitter: bool,
}

impl MockGateway {
    fn recorded(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionClient for MockGateway {
    async fn send(&self, request: &ApiRequest) -> anyhow::Result<ApiResponse> {
        if self.jitter {
            tokio::time::sleep(std::time::Duration::from_millis(fastrand::u64(0..5))).await;
        }
        self.requests.lock().unwrap().push(request.clone());

        if request.path.ends_with("/dcc-rates") {
            if self.fail_rate_inquiry {
                return Ok(ApiResponse::with_status(
                    503,
                    json!({"title": "Service Unavailable", "detail": "rate service down"}),
                ));
            }
            return Ok(ApiResponse::ok(json!({
                "proposal": {
                    "rateReferenceId": "rr1",
                    "originalAmount": request.body["transaction"]["amount"].clone(),
                    "resultingAmount": {"amount": 115, "currencyCode": "EUR", "numberOfDecimals": 2},
                    "rate": {"exchangeRate": 1.15}
                }
            })));
        }
        if let Some(suffix) = &self.fail_path_suffix {
            if request.path.ends_with(suffix.as_str()) {
                return Ok(ApiResponse::with_status(
                    500,
                    json!({"title": "Internal Server Error", "detail": "injected failure"}),
                ));
            }
        }
        if request.path.ends_with("/payments") && request.method == HttpMethod::Post {
            let id = format!("pay-{}", self.payment_seq.fetch_add(1, Ordering::SeqCst));
            return Ok(ApiResponse::ok(json!({"paymentId": id, "status": "AUTHORIZED"})));
        }
        if request.method == HttpMethod::Post && request.path.ends_with("/refunds") {
            let id = format!("ref-{}", self.refund_seq.fetch_add(1, Ordering::SeqCst));
            if request.path.contains("/payments/") {
                return Ok(ApiResponse::ok(
                    json!({"refund": {"refundId": id, "status": "AUTHORIZED"}}),
                ));
            }
            return Ok(ApiResponse::ok(json!({"refundId": id, "status": "AUTHORIZED"})));
        }
        Ok(ApiResponse::ok(json!({"status": "OK"})))
    }
}

fn step_params(test_id: &str, amount: i64) -> Value {
    json!({
        "test_id": test_id,
        "acquirer_id": "100812",
        "merchant_id": "520000211",
        "amount": amount,
        "currency": "GBP",
    })
}

fn payment_chain(chain_id: &str, prefix: &str) -> ChainDefinition {
    ChainDefinition::new(chain_id)
        .with_step(
            ChainStep::new(1, OperationKind::CreatePayment)
                .with_params(step_params(&format!("{}1", prefix), 100)),
        )
        .with_step(
            ChainStep::new(2, OperationKind::CapturePayment)
                .with_params(step_params(&format!("{}2", prefix), 100)),
        )
}

fn engine(client: Arc<MockGateway>) -> (Arc<ChainOrchestrator>, Arc<ChainStateStore>) {
    let catalog = Arc::new(OperationCatalog::builtin().unwrap());
    let conversion = Arc::new(ConversionManager::new());
    let store = Arc::new(ChainStateStore::temporary().unwrap());
    let orchestrator = Arc::new(ChainOrchestrator::new(
        catalog,
        conversion,
        client,
        store.clone(),
    ));
    (orchestrator, store)
}

#[tokio::test]
async fn test_chain_threads_payment_id_through_capture() {
    init_tracing();
    let client = Arc::new(MockGateway::default());
    let (orchestrator, store) = engine(client.clone());

    let report = orchestrator
        .run(&payment_chain("chain-1", "T"), "exec-1")
        .await
        .unwrap();

    assert_eq!(report.passed(), 2);
    assert_eq!(report.failed(), 0);
    assert!(!report.is_aborted());

    let capture = client
        .recorded()
        .into_iter()
        .find(|r| r.path.contains("/captures"))
        .expect("capture request was sent");
    assert!(capture.path.contains("pay-0"), "path: {}", capture.path);

    let state = store.load("chain-1").unwrap().unwrap();
    assert_eq!(state.status, ChainStatus::Completed);
    assert_eq!(state.get_output("payment_id"), Some(&json!("pay-0")));
}

#[tokio::test]
async fn test_failed_create_yields_missing_dependency_for_capture() {
    init_tracing();
    let client = Arc::new(MockGateway {
        fail_path_suffix: Some("/payments".to_string()),
        ..Default::default()
    });
    let (orchestrator, store) = engine(client);

    let report = orchestrator
        .run(&payment_chain("chain-1", "T"), "exec-1")
        .await
        .unwrap();

    // The chain survives both failures; nothing is aborted.
    assert!(!report.is_aborted());
    assert_eq!(report.results.len(), 2);

    let create = &report.results[0];
    assert!(!create.passed);
    assert_eq!(create.http_status, Some(500));
    match &create.failure {
        Some(StepFailure::Invocation { detail }) => {
            assert_eq!(detail.title.as_deref(), Some("Internal Server Error"));
        }
        other => panic!("unexpected failure: {:?}", other),
    }

    let capture = &report.results[1];
    assert!(capture.is_missing_dependency());
    assert_eq!(
        capture.failure,
        Some(StepFailure::MissingDependency {
            key: "payment_id".to_string()
        })
    );

    // The context was never mutated.
    let state = store.load("chain-1").unwrap().unwrap();
    assert!(state.previous_outputs.is_empty());
    assert_eq!(state.status, ChainStatus::Completed);
}

#[tokio::test]
async fn test_conversion_result_threads_through_chain() {
    init_tracing();
    let client = Arc::new(MockGateway::default());
    let (orchestrator, _store) = engine(client.clone());

    let chain = ChainDefinition::new("dcc-chain")
        .with_step(ChainStep::new(1, OperationKind::CreatePayment).with_params(json!({
            "test_id": "D1",
            "acquirer_id": "100812",
            "merchant_id": "520000211",
            "amount": 100,
            "currency": "GBP",
            "use_conversion": true,
            "target_currency": "EUR",
        })))
        .with_step(
            ChainStep::new(2, OperationKind::CapturePayment).with_params(step_params("D2", 100)),
        );

    let report = orchestrator.run(&chain, "exec-1").await.unwrap();
    assert_eq!(report.passed(), 2);

    let requests = client.recorded();
    let inquiries: Vec<_> = requests
        .iter()
        .filter(|r| r.path.ends_with("/dcc-rates"))
        .collect();
    assert_eq!(inquiries.len(), 1);
    assert_eq!(
        inquiries[0].body["transaction"]["transactionType"],
        json!("PAYMENT")
    );

    // The create request carries the converted amount and the rate reference.
    let create = requests
        .iter()
        .find(|r| r.path.ends_with("/payments"))
        .unwrap();
    assert_eq!(create.body["amount"]["amount"], json!(115));
    assert_eq!(create.body["amount"]["currencyCode"], json!("EUR"));
    assert_eq!(
        create.body["dynamicCurrencyConversion"]["rateReferenceId"],
        json!("rr1")
    );

    // Every later amount-bearing step resolves to the converted amount,
    // regardless of its own declared amount/currency.
    let capture = requests
        .iter()
        .find(|r| r.path.contains("/captures"))
        .unwrap();
    assert_eq!(capture.body["amount"]["amount"], json!(115));
    assert_eq!(capture.body["amount"]["currencyCode"], json!("EUR"));
}

#[tokio::test]
async fn test_unknown_operation_aborts_chain() {
    init_tracing();
    let client = Arc::new(MockGateway::default());
    let conversion = Arc::new(ConversionManager::new());
    let store = Arc::new(ChainStateStore::temporary().unwrap());

    // A catalog missing get_payment: lookup must abort the chain mid-way.
    let mut catalog = OperationCatalog::new();
    catalog
        .register(Arc::new(chainrunner::catalog::operations::CreatePayment))
        .unwrap();
    catalog
        .register(Arc::new(chainrunner::catalog::operations::CapturePayment))
        .unwrap();
    let orchestrator = ChainOrchestrator::new(Arc::new(catalog), conversion, client, store.clone());

    let chain = ChainDefinition::new("chain-1")
        .with_step(
            ChainStep::new(1, OperationKind::CreatePayment).with_params(step_params("T1", 100)),
        )
        .with_step(ChainStep::new(2, OperationKind::GetPayment).with_params(step_params("T2", 100)))
        .with_step(
            ChainStep::new(3, OperationKind::CapturePayment).with_params(step_params("T3", 100)),
        );

    let report = orchestrator.run(&chain, "exec-1").await.unwrap();
    assert!(report.is_aborted());
    // Only the create ran; no further results were produced for the chain.
    assert_eq!(report.results.len(), 1);
    assert!(report.results[0].passed);

    let state = store.load("chain-1").unwrap().unwrap();
    assert_eq!(state.status, ChainStatus::Failed);
    assert!(state
        .error_message
        .as_deref()
        .unwrap()
        .contains("unknown operation type: get_payment"));
}

#[tokio::test]
async fn test_conversion_inquiry_failure_aborts_chain() {
    init_tracing();
    let client = Arc::new(MockGateway {
        fail_rate_inquiry: true,
        ..Default::default()
    });
    let (orchestrator, store) = engine(client);

    let chain = ChainDefinition::new("chain-1")
        .with_step(ChainStep::new(1, OperationKind::CreatePayment).with_params(json!({
            "test_id": "T1",
            "acquirer_id": "100812",
            "merchant_id": "520000211",
            "amount": 100,
            "currency": "GBP",
            "use_conversion": true,
        })))
        .with_step(
            ChainStep::new(2, OperationKind::CapturePayment).with_params(step_params("T2", 100)),
        );

    let report = orchestrator.run(&chain, "exec-1").await.unwrap();
    assert!(report.is_aborted());
    assert_eq!(report.results.len(), 0);
    assert_eq!(
        store.load("chain-1").unwrap().unwrap().status,
        ChainStatus::Failed
    );
}

#[tokio::test]
async fn test_batch_result_count_matches_total_steps() {
    init_tracing();
    let client = Arc::new(MockGateway::default());
    let (orchestrator, _store) = engine(client);
    let scheduler = ConcurrencyScheduler::new(orchestrator);

    let chains = vec![payment_chain("chain-a", "A"), payment_chain("chain-b", "B")];
    let batch = scheduler
        .run_batch(chains, BatchOptions::with_workers(2))
        .await
        .unwrap();

    assert_eq!(batch.reports.len(), 2);
    assert_eq!(batch.total_steps(), 4);
    assert_eq!(batch.passed(), 4);
    assert_eq!(batch.aborted_chains(), 0);
    for report in &batch.reports {
        assert_eq!(report.results.len(), 2);
    }
}

#[tokio::test]
async fn test_chain_isolation_under_concurrent_interleavings() {
    init_tracing();
    // Both chains produce the same output key with different values; under
    // randomized interleavings neither may ever observe the other's value.
    for round in 0..8 {
        let client = Arc::new(MockGateway {
            jitter: true,
            ..Default::default()
        });
        let (orchestrator, store) = engine(client.clone());
        let scheduler = ConcurrencyScheduler::new(orchestrator);

        let chains = vec![payment_chain("chain-a", "A"), payment_chain("chain-b", "B")];
        let batch = scheduler
            .run_batch(chains, BatchOptions::with_workers(2))
            .await
            .unwrap();
        assert_eq!(batch.passed(), 4, "round {}", round);

        for chain_id in ["chain-a", "chain-b"] {
            let state = store.load(chain_id).unwrap().unwrap();
            let payment_id = state.get_output("payment_id").unwrap().as_str().unwrap();
            let prefix = if chain_id == "chain-a" { "A2-" } else { "B2-" };
            let capture = client
                .recorded()
                .into_iter()
                .find(|r| {
                    r.path.contains("/captures")
                        && r.body["operationId"].as_str().unwrap().starts_with(prefix)
                })
                .expect("capture request for chain");
            assert!(
                capture.path.contains(payment_id),
                "round {}: chain {} captured against foreign payment ({})",
                round,
                chain_id,
                capture.path
            );
        }
    }
}

#[tokio::test]
async fn test_tag_filter_selects_chains() {
    init_tracing();
    let chains = vec![
        payment_chain("smoke-visa", "A").with_tags(["smoke", "visa"]),
        payment_chain("smoke-visa-slow", "B").with_tags(["smoke", "visa", "slow"]),
        payment_chain("smoke-only", "C").with_tags(["smoke"]),
    ];

    let filter = TagFilter::all_of(["smoke", "visa"], ["slow"]);
    let selected = filter.filter_chains(chains);
    let ids: Vec<_> = selected.iter().map(|c| c.chain_id.as_str()).collect();
    assert_eq!(ids, vec!["smoke-visa"]);
}

#[tokio::test]
async fn test_standalone_refund_feeds_refund_capture() {
    init_tracing();
    let client = Arc::new(MockGateway::default());
    let (orchestrator, store) = engine(client.clone());

    let chain = ChainDefinition::new("refund-chain")
        .with_step(
            ChainStep::new(1, OperationKind::StandaloneRefund).with_params(step_params("R1", 300)),
        )
        .with_step(
            ChainStep::new(2, OperationKind::CaptureRefund).with_params(step_params("R2", 300)),
        );

    let report = orchestrator.run(&chain, "exec-1").await.unwrap();
    assert_eq!(report.passed(), 2);

    let state = store.load("refund-chain").unwrap().unwrap();
    assert_eq!(state.get_output("refund_id"), Some(&json!("ref-0")));
    let capture = client
        .recorded()
        .into_iter()
        .find(|r| r.path.contains("/refunds/ref-0/captures"))
        .expect("refund capture request");
    assert_eq!(capture.method, HttpMethod::Post);
}
