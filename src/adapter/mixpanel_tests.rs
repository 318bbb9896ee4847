//! Tests for the Mixpanel adapter.

use super::{Adapter, AdapterError, Mixpanel, MixpanelConfig};
use crate::event::{Event, Props};
use crate::testing::{FixedClock, MockClient, header, json_body, text_response};
use serde_json::json;
use std::sync::Arc;

fn adapter(client: Arc<MockClient>) -> Mixpanel<Arc<MockClient>, FixedClock> {
    Mixpanel::new(
        client,
        MixpanelConfig::new("tok").with_endpoint("https://mixpanel.test"),
    )
    .with_clock(FixedClock(1_700_000_000))
}

fn signup() -> Event {
    Event::new("signup", "https://example.com/signup")
        .with_name("Signed up")
        .with_prop("distinct_id", "user-1")
        .with_prop("plan", "pro")
}

mod track_payload {
    use super::*;

    #[test]
    fn reserved_properties_come_first_and_win() {
        let event = signup().with_prop("token", "spoofed");

        let payload = adapter(MockClient::ok()).track_payload(&event).unwrap();

        assert_eq!(
            payload,
            json!([{
                "event": "Signed up",
                "properties": {
                    "token": "tok",
                    "time": 1_700_000_000.0,
                    "distinct_id": "user-1",
                    "plan": "pro",
                },
            }])
        );
    }

    #[test]
    fn time_prop_overrides_clock() {
        let event = signup().with_prop("time", 42);

        let payload = adapter(MockClient::ok()).track_payload(&event).unwrap();

        assert_eq!(payload[0]["properties"]["time"], 42);
    }

    #[test]
    fn name_falls_back_to_type() {
        let event = Event::new("signup", "https://example.com/").with_prop("distinct_id", 7);

        let payload = adapter(MockClient::ok()).track_payload(&event).unwrap();

        assert_eq!(payload[0]["event"], "signup");
        assert_eq!(payload[0]["properties"]["distinct_id"], 7);
    }

    #[test]
    fn requires_distinct_id() {
        let event = Event::new("signup", "https://example.com/").with_prop("distinct_id", "");

        let result = adapter(MockClient::ok()).track_payload(&event);

        assert!(matches!(result, Err(AdapterError::Precondition { .. })));
    }
}

mod send {
    use super::*;

    #[tokio::test]
    async fn one_means_accepted() {
        let client = MockClient::replying(vec![text_response(200, "1")]);
        let mixpanel = adapter(Arc::clone(&client));

        assert!(mixpanel.send(&signup()).await.unwrap());

        let req = client.last_request();
        assert_eq!(req.url.as_str(), "https://mixpanel.test/track");
        assert_eq!(header(&req, "accept"), Some("text/plain"));
        assert_eq!(json_body(&req)[0]["properties"]["distinct_id"], "user-1");
    }

    #[tokio::test]
    async fn zero_means_rejected() {
        let client = MockClient::replying(vec![text_response(200, "0")]);

        assert!(!adapter(client).send(&signup()).await.unwrap());
    }

    #[tokio::test]
    async fn missing_distinct_id_makes_no_call() {
        let client = MockClient::ok();
        let event = Event::new("signup", "https://example.com/");

        let result = adapter(Arc::clone(&client)).send(&event).await;

        assert!(matches!(result, Err(AdapterError::Precondition { .. })));
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn forwarding_is_unsupported() {
        let mut mixpanel = adapter(MockClient::ok());

        assert!(matches!(
            mixpanel.set_client_ip("203.0.113.9"),
            Err(AdapterError::Unsupported { operation: "set_client_ip", .. })
        ));
        assert!(matches!(
            mixpanel.set_user_agent("curl"),
            Err(AdapterError::Unsupported { operation: "set_user_agent", .. })
        ));
    }
}

mod validate {
    use super::*;

    #[tokio::test]
    async fn rejected_track_is_unconfirmed() {
        let client = MockClient::replying(vec![text_response(200, "0")]);

        let err = adapter(client).validate(&signup()).await.unwrap_err();

        assert!(matches!(err, AdapterError::Unconfirmed { .. }));
    }

    #[tokio::test]
    async fn structurally_invalid_event_makes_no_call() {
        let client = MockClient::replying(vec![text_response(200, "1")]);
        let event = Event::default().with_prop("distinct_id", "user-1");

        let err = adapter(Arc::clone(&client)).validate(&event).await.unwrap_err();

        assert!(matches!(err, AdapterError::Precondition { .. }));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn missing_name_is_precondition() {
        let client = MockClient::ok();
        let event =
            Event::new("signup", "https://example.com/signup").with_prop("distinct_id", "user-1");

        let err = adapter(Arc::clone(&client)).validate(&event).await.unwrap_err();

        assert!(matches!(err, AdapterError::Precondition { .. }));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn http_error_propagates() {
        let client = MockClient::replying(vec![text_response(401, "bad token")]);

        let err = adapter(client).validate(&signup()).await.unwrap_err();

        assert_eq!(err.status(), 401);
    }
}

mod profiles {
    use super::*;

    #[tokio::test]
    async fn set_profile_posts_set_operation() {
        let client = MockClient::replying(vec![text_response(200, "1")]);
        let mut props = Props::new();
        props.insert("$email".into(), json!("a@example.com"));

        let accepted = adapter(Arc::clone(&client))
            .set_profile("user-1", &props)
            .await
            .unwrap();

        assert!(accepted);
        let req = client.last_request();
        assert_eq!(req.url.path(), "/engage");
        assert_eq!(req.url.fragment(), Some("profile-set"));
        assert_eq!(
            json_body(&req),
            json!([{"$token": "tok", "$distinct_id": "user-1", "$set": {"$email": "a@example.com"}}])
        );
    }

    #[tokio::test]
    async fn union_profile_posts_union_operation() {
        let client = MockClient::replying(vec![text_response(200, "1")]);
        let mut props = Props::new();
        props.insert("tags".into(), json!(["beta"]));

        adapter(Arc::clone(&client))
            .union_profile("user-1", &props)
            .await
            .unwrap();

        let body = json_body(&client.last_request());
        assert_eq!(body[0]["$union"], json!({"tags": ["beta"]}));
    }
}
