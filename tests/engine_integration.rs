use chrono::{TimeZone, Utc};
use fx_engine::{
    Account, ConversionRequest, Direction, EngineConfig, FinanceEngine, Money, Transaction,
};
use std::fs;
use std::sync::Arc;
use tracing::info;

mod test_utils {
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Frankfurter-style feed quoting the whole table against USD.
    pub async fn create_rate_mock_server(body: &str, expected_hits: u64) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .set_delay(Duration::from_millis(20)),
            )
            .expect(expected_hits)
            .mount(&mock_server)
            .await;

        mock_server
    }

    pub async fn create_failing_mock_server() -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        mock_server
    }
}

fn engine_from_yaml(config_content: &str) -> FinanceEngine {
    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    fs::write(config_file.path(), config_content).expect("Failed to write config file");

    let config = EngineConfig::load_from_path(config_file.path()).expect("Failed to load config");
    FinanceEngine::new(&config)
}

#[test_log::test(tokio::test)]
async fn test_full_net_worth_flow_with_mock() {
    let mock_server = test_utils::create_rate_mock_server(
        r#"{"amount":1.0,"base":"USD","date":"2024-05-10","rates":{"EUR":0.9234,"INR":83.12}}"#,
        1,
    )
    .await;

    let config_content = format!(
        r#"
        pivot_currency: "USD"
        providers:
          - kind: frankfurter
            base_url: {}
        "#,
        mock_server.uri()
    );
    let engine = engine_from_yaml(&config_content);

    let accounts = vec![
        Account::new("checking", Money::new(10_000, "USD")),
        Account::new("savings", Money::new(9_234, "EUR")),
    ];
    let transactions = vec![Transaction {
        account_id: "checking".to_string(),
        direction: Direction::Credit,
        amount: Money::new(5_000, "USD"),
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        category: Some("salary".to_string()),
    }];

    let net_worth = engine.net_worth(&accounts, &transactions, "USD").await;
    info!(?net_worth, "Computed net worth");

    // 150.00 USD checking + 92.34 EUR at 0.9234 EUR/USD = 100.00 USD savings.
    assert_eq!(net_worth.total, Money::new(25_000, "USD"));
    assert!(net_worth.excluded.is_empty());
    assert!(!net_worth.stale);
}

#[test_log::test(tokio::test)]
async fn test_failover_to_next_provider() {
    let broken_server = test_utils::create_failing_mock_server().await;
    let fallback_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path("/v6/latest/USD"))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_body_string(r#"{"result":"success","rates":{"EUR":0.9}}"#),
        )
        .expect(1)
        .mount(&fallback_server)
        .await;

    let config_content = format!(
        r#"
        providers:
          - kind: frankfurter
            base_url: {}
          - kind: open-er-api
            base_url: {}
        "#,
        broken_server.uri(),
        fallback_server.uri()
    );
    let engine = engine_from_yaml(&config_content);

    let result = engine
        .convert(&Money::new(1_000, "USD"), "EUR")
        .await
        .expect("conversion should fail over to the second provider");
    assert_eq!(result.amount, Money::new(900, "EUR"));
    assert!(!result.stale);
}

#[test_log::test(tokio::test)]
async fn test_quota_blocks_refresh_and_falls_back_to_stale() {
    // TTL of zero makes every cached rate stale immediately, forcing a
    // refresh attempt on the second conversion.
    let mock_server = test_utils::create_rate_mock_server(
        r#"{"amount":1.0,"base":"USD","date":"2024-05-10","rates":{"EUR":0.9}}"#,
        1,
    )
    .await;

    let config_content = format!(
        r#"
        cache_ttl_secs: 0
        providers:
          - kind: frankfurter
            base_url: {}
            limits:
              - window_secs: 60
                max_requests: 1
        "#,
        mock_server.uri()
    );
    let engine = engine_from_yaml(&config_content);

    let first = engine.convert(&Money::new(1_000, "USD"), "EUR").await.unwrap();
    assert_eq!(first.amount, Money::new(900, "EUR"));

    // The quota is spent, so the refresh is denied and the previous rate is
    // served as a best-effort stale result.
    let second = engine.convert(&Money::new(2_000, "USD"), "EUR").await.unwrap();
    assert_eq!(second.amount, Money::new(1_800, "EUR"));
    assert!(second.stale);
}

#[test_log::test(tokio::test)]
async fn test_cache_snapshot_survives_restart() {
    let cache_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let cache_path = cache_dir.path().join("rates.json");

    let mock_server = test_utils::create_rate_mock_server(
        r#"{"amount":1.0,"base":"USD","date":"2024-05-10","rates":{"EUR":0.9}}"#,
        1,
    )
    .await;
    let config_content = format!(
        r#"
        cache_path: {}
        providers:
          - kind: frankfurter
            base_url: {}
        "#,
        cache_path.display(),
        mock_server.uri()
    );

    let engine = engine_from_yaml(&config_content);
    let result = engine.convert(&Money::new(1_000, "USD"), "EUR").await.unwrap();
    assert_eq!(result.amount, Money::new(900, "EUR"));
    drop(engine);

    // A restarted engine must serve from the snapshot without any fetch.
    let silent_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(wiremock::ResponseTemplate::new(200))
        .expect(0)
        .mount(&silent_server)
        .await;

    let restarted_config = format!(
        r#"
        cache_path: {}
        providers:
          - kind: frankfurter
            base_url: {}
        "#,
        cache_path.display(),
        silent_server.uri()
    );
    let restarted = engine_from_yaml(&restarted_config);

    let result = restarted.convert(&Money::new(2_000, "USD"), "EUR").await.unwrap();
    assert_eq!(result.amount, Money::new(1_800, "EUR"));
    assert!(!result.stale);
}

#[test_log::test(tokio::test)]
async fn test_concurrent_requests_share_one_fetch() {
    let mock_server = test_utils::create_rate_mock_server(
        r#"{"amount":1.0,"base":"USD","date":"2024-05-10","rates":{"EUR":0.9,"INR":83.12}}"#,
        1,
    )
    .await;

    let config_content = format!(
        r#"
        providers:
          - kind: frankfurter
            base_url: {}
        "#,
        mock_server.uri()
    );
    let engine = Arc::new(engine_from_yaml(&config_content));

    let tasks: Vec<_> = (0..6)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let target = if i % 2 == 0 { "EUR" } else { "INR" };
            tokio::spawn(async move {
                engine.convert(&Money::new(1_000, "USD"), target).await
            })
        })
        .collect();

    for task in tasks {
        let result = task.await.expect("task panicked");
        assert!(result.is_ok(), "conversion failed: {:?}", result.err());
    }
}

#[test_log::test(tokio::test)]
async fn test_batch_convert_mixed_targets() {
    let mock_server = test_utils::create_rate_mock_server(
        r#"{"amount":1.0,"base":"USD","date":"2024-05-10","rates":{"EUR":0.5,"INR":80}}"#,
        1,
    )
    .await;

    let config_content = format!(
        r#"
        providers:
          - kind: frankfurter
            base_url: {}
        "#,
        mock_server.uri()
    );
    let engine = engine_from_yaml(&config_content);

    let requests = vec![
        ConversionRequest::current(Money::new(10_000, "EUR"), "INR"),
        ConversionRequest::current(Money::new(1_000, "USD"), "USD"),
        ConversionRequest::current(Money::new(1_000, "USD"), "XXX"),
    ];
    let results = engine.batch_convert(&requests).await;

    // EUR -> INR through the pivot: 80 / 0.5 = 160.
    assert_eq!(results[0].as_ref().unwrap().amount, Money::new(1_600_000, "INR"));
    assert_eq!(results[1].as_ref().unwrap().amount, Money::new(1_000, "USD"));
    assert!(results[2].is_err());
}
