//! Tests for the dispatcher.

use std::sync::Arc;

use serde_json::json;

use crate::adapter::{
    Adapter, AdapterError, ClickHouse, ClickHouseConfig, GoogleAnalytics, GoogleAnalyticsConfig,
    Mixpanel, MixpanelConfig, Orbit, OrbitConfig, ReoDev, ReoDevConfig,
};
use crate::config::ValidatedConfig;
use crate::event::Event;
use crate::testing::{MockClient, json_response, text_response};

use super::{Backend, DispatchReport, Dispatcher};

type TestDispatcher = Dispatcher<Arc<MockClient>>;

fn signup() -> Event {
    Event::new("signup", "https://example.com/signup")
        .with_name("Signed up")
        .with_prop("email", "jane@example.com")
        .with_prop("distinct_id", "user-1")
}

fn ga(client: &Arc<MockClient>) -> GoogleAnalytics<Arc<MockClient>> {
    GoogleAnalytics::new(
        Arc::clone(client),
        GoogleAnalyticsConfig::new("UA-1", "555").with_endpoint("https://ga.test"),
    )
}

fn orbit(client: &Arc<MockClient>) -> Orbit<Arc<MockClient>> {
    Orbit::new(
        Arc::clone(client),
        OrbitConfig::new("acme", "key", "web").with_endpoint("https://orbit.test/api/v1"),
    )
    .unwrap()
}

mod backend {
    use super::*;

    #[test]
    fn delegates_name_and_state() {
        let client = MockClient::ok();
        let mut backend: Backend<_> = orbit(&client).into();

        assert_eq!(backend.name(), "Orbit");
        assert!(backend.is_enabled());

        backend.disable();
        assert!(!backend.is_enabled());
    }

    #[test]
    fn delegates_forwarding_setters() {
        let client = MockClient::ok();
        let mut supported: Backend<_> = ga(&client).into();
        let mut unsupported: Backend<_> = orbit(&client).into();

        supported.set_client_ip("203.0.113.9").unwrap();
        assert_eq!(supported.state().client_ip(), Some("203.0.113.9"));

        assert!(matches!(
            unsupported.set_user_agent("curl/8"),
            Err(AdapterError::Unsupported { adapter: "Orbit", .. })
        ));
    }

    #[tokio::test]
    async fn delegates_send() {
        let client = MockClient::ok();
        let backend: Backend<_> = ga(&client).into();

        assert!(backend.send(&signup()).await.unwrap());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn delegates_validate() {
        let client = MockClient::ok();
        let backend: Backend<_> = ReoDev::new(
            Arc::clone(&client),
            ReoDevConfig::new("me@acme.test", "key", "l1"),
        )
        .unwrap()
        .into();

        assert!(matches!(
            backend.validate(&signup()).await,
            Err(AdapterError::Unsupported { .. })
        ));
    }
}

mod dispatch {
    use super::*;

    #[tokio::test]
    async fn sends_to_every_backend_in_order() {
        let client = MockClient::ok();
        let dispatcher = TestDispatcher::new()
            .with_backend(ga(&client))
            .with_backend(orbit(&client));

        let report = dispatcher.dispatch(&signup()).await;

        assert_eq!(client.calls(), 2);
        let hosts: Vec<_> = client
            .requests()
            .iter()
            .map(|r| r.url.host_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(hosts, ["ga.test", "orbit.test"]);
        assert_eq!(report.accepted(), 2);
        assert!(report.all_accepted());
    }

    #[tokio::test]
    async fn failure_does_not_stop_the_loop() {
        let client = MockClient::replying(vec![
            text_response(500, "boom"),
            json_response(200, &json!({})),
        ]);
        let dispatcher = TestDispatcher::new()
            .with_backend(ga(&client))
            .with_backend(orbit(&client));

        let report = dispatcher.dispatch(&signup()).await;

        assert_eq!(client.calls(), 2);
        assert!(matches!(report.outcome("GoogleAnalytics"), Some(Ok(false))));
        assert!(matches!(report.outcome("Orbit"), Some(Ok(true))));
        assert!(!report.all_accepted());
    }

    #[tokio::test]
    async fn precondition_errors_are_reported() {
        let client = MockClient::ok();
        let dispatcher = TestDispatcher::new()
            .with_backend(Mixpanel::new(Arc::clone(&client), MixpanelConfig::new("tok")))
            .with_backend(ga(&client));
        let anonymous = Event::new("pageview", "https://example.com/").with_name("pageview");

        let report = dispatcher.dispatch(&anonymous).await;

        let failures: Vec<_> = report.failures().map(|(name, _)| name).collect();
        assert_eq!(failures, ["Mixpanel"]);
        assert_eq!(report.accepted(), 1);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn disabled_backend_is_skipped() {
        let client = MockClient::ok();
        let mut dispatcher = TestDispatcher::new()
            .with_backend(ga(&client))
            .with_backend(orbit(&client));

        dispatcher.backend_mut("GoogleAnalytics").unwrap().disable();
        let report = dispatcher.dispatch(&signup()).await;

        assert_eq!(client.calls(), 1);
        assert!(matches!(report.outcome("GoogleAnalytics"), Some(Ok(false))));
    }

    #[tokio::test]
    async fn empty_dispatcher_reports_nothing() {
        let dispatcher = TestDispatcher::default();

        let report = dispatcher.dispatch(&signup()).await;

        assert!(dispatcher.is_empty());
        assert!(report.outcomes.is_empty());
        assert!(report.all_accepted());
    }

    #[test]
    fn unknown_backend_name() {
        let mut dispatcher = TestDispatcher::new();

        assert!(dispatcher.backend_mut("Segment").is_none());
    }
}

mod validate {
    use super::*;

    #[tokio::test]
    async fn collects_every_confirmation() {
        let client = MockClient::replying(vec![
            json_response(200, &json!({"meta": [], "data": [{"cnt": "1"}]})),
        ]);
        let dispatcher = TestDispatcher::new()
            .with_backend(ClickHouse::new(
                Arc::clone(&client),
                ClickHouseConfig::new("http://clickhouse.test:8123"),
            ))
            .with_backend(ReoDev::new(
                Arc::clone(&client),
                ReoDevConfig::new("me@acme.test", "key", "l1"),
            )
            .unwrap());

        let report = dispatcher.validate(&signup()).await;

        assert!(matches!(report.outcome("ClickHouse"), Some(Ok(true))));
        assert!(matches!(
            report.outcome("ReoDev"),
            Some(Err(AdapterError::Unsupported { .. }))
        ));
        assert_eq!(client.calls(), 1);
    }
}

mod from_config {
    use super::*;

    #[test]
    fn builds_configured_backends_in_order() {
        let config = ValidatedConfig::parse(
            r#"
            [reodev]
            email = "me@acme.test"
            api_key = "key"
            list_id = "l1"

            [mixpanel]
            token = "tok"

            [clickhouse]
            endpoint = "http://localhost:8123"
            enabled = false
        "#,
        )
        .unwrap();

        let dispatcher = Dispatcher::from_config(&config, MockClient::ok()).unwrap();

        let names: Vec<_> = dispatcher.backends().iter().map(Adapter::name).collect();
        assert_eq!(names, ["Mixpanel", "ReoDev", "ClickHouse"]);
        let enabled: Vec<_> = dispatcher.backends().iter().map(Adapter::is_enabled).collect();
        assert_eq!(enabled, [true, true, false]);
    }

    #[test]
    fn empty_config_builds_empty_dispatcher() {
        let config = ValidatedConfig::parse("").unwrap();

        let dispatcher = Dispatcher::from_config(&config, MockClient::ok()).unwrap();

        assert_eq!(dispatcher.len(), 0);
    }

    #[test]
    fn unusable_credential_is_an_error() {
        let config = ValidatedConfig::parse("[hubspot]\ntoken = \"bad\\ntoken\"").unwrap();

        let result = Dispatcher::from_config(&config, MockClient::ok());

        assert!(matches!(result, Err(AdapterError::Invoke(_))));
    }

    #[tokio::test]
    async fn shared_client_serves_every_backend() {
        let client = MockClient::ok();
        let config = ValidatedConfig::parse(
            r#"
            [google_analytics]
            tracking_id = "UA-1"
            client_id = "555"

            [orbit]
            workspace_id = "acme"
            api_key = "key"
            data_origin = "web"
        "#,
        )
        .unwrap();
        let dispatcher = Dispatcher::from_config(&config, Arc::clone(&client)).unwrap();

        let report: DispatchReport = dispatcher.dispatch(&signup()).await;

        assert_eq!(report.accepted(), 2);
        assert_eq!(client.calls(), 2);
    }
}
