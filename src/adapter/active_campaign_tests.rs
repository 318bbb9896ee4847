//! Tests for the ActiveCampaign adapter.

use super::{ActiveCampaign, ActiveCampaignConfig, Adapter, AdapterError, Contact};
use crate::event::Event;
use crate::invoker::HttpResponse;
use crate::testing::{MockClient, form_field, header, json_body, json_response, query_param};
use serde_json::json;
use std::sync::Arc;

fn adapter(client: Arc<MockClient>) -> ActiveCampaign<Arc<MockClient>> {
    ActiveCampaign::new(
        client,
        ActiveCampaignConfig::new("trk", "123", "api-key", "acme")
            .with_endpoints("https://track.test/event", "https://acme.test/api/3"),
    )
    .unwrap()
}

fn trial_started() -> Event {
    Event::new("trial", "https://example.com/pricing")
        .with_name("Trial started")
        .with_prop("email", "jane@example.com")
        .with_prop("plan", "team")
}

fn found(collection: &str, id: &str) -> HttpResponse {
    json_response(200, &json!({collection: [{"id": id}], "meta": {"total": "1"}}))
}

fn not_found(collection: &str) -> HttpResponse {
    json_response(200, &json!({collection: [], "meta": {"total": 0}}))
}

mod config {
    use super::*;

    #[test]
    fn api_endpoint_derives_from_account() {
        let config = ActiveCampaignConfig::new("trk", "123", "api-key", "acme");

        assert_eq!(config.api_endpoint, "https://acme.api-us1.com/api/3");
        assert_eq!(config.tracking_endpoint, "https://trackcmp.net/event");
    }

    #[test]
    fn rejects_api_key_that_is_not_a_header_value() {
        let result = ActiveCampaign::new(
            MockClient::ok(),
            ActiveCampaignConfig::new("trk", "123", "bad\nkey", "acme"),
        );

        assert!(matches!(result, Err(AdapterError::Invoke(_))));
    }
}

mod tracking_params {
    use super::*;

    #[test]
    fn serializes_props_and_visit() {
        let params = adapter(MockClient::ok())
            .tracking_params(&trial_started())
            .unwrap();

        assert_eq!(
            params,
            json!({
                "key": "trk",
                "event": "Trial started",
                "actid": "123",
                "eventdata": r#"{"email":"jane@example.com","plan":"team"}"#,
                "visit": r#"{"email":"jane@example.com"}"#,
            })
        );
    }

    #[test]
    fn event_name_falls_back_to_type() {
        let event = Event::new("trial", "https://example.com/").with_prop("email", "a@b.test");

        let params = adapter(MockClient::ok()).tracking_params(&event).unwrap();

        assert_eq!(params["event"], "trial");
    }
}

mod send {
    use super::*;

    #[tokio::test]
    async fn posts_form_to_tracker_without_api_token() {
        let client = MockClient::replying(vec![json_response(200, &json!({"success": 1}))]);

        assert!(adapter(Arc::clone(&client)).send(&trial_started()).await.unwrap());

        let req = client.last_request();
        assert_eq!(req.url.as_str(), "https://track.test/event");
        assert_eq!(
            header(&req, "content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(header(&req, "api-token"), None);
        assert_eq!(form_field(&req, "actid").as_deref(), Some("123"));
        assert_eq!(
            form_field(&req, "visit").as_deref(),
            Some(r#"{"email":"jane@example.com"}"#)
        );
    }

    #[tokio::test]
    async fn success_zero_is_rejected() {
        let client = MockClient::replying(vec![json_response(
            200,
            &json!({"success": 0, "message": "Contact not found"}),
        )]);

        assert!(!adapter(client).send(&trial_started()).await.unwrap());
    }

    #[tokio::test]
    async fn missing_email_makes_no_call() {
        let client = MockClient::ok();
        let event = Event::new("trial", "https://example.com/pricing");

        let result = adapter(Arc::clone(&client)).send(&event).await;

        assert!(matches!(result, Err(AdapterError::Precondition { .. })));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn transport_failure_is_false() {
        assert!(!adapter(MockClient::failing()).send(&trial_started()).await.unwrap());
    }
}

mod validate {
    use super::*;

    #[tokio::test]
    async fn looks_up_contact_then_tracks() {
        let client = MockClient::replying(vec![
            found("contacts", "42"),
            json_response(200, &json!({"success": 1})),
        ]);

        assert!(adapter(Arc::clone(&client)).validate(&trial_started()).await.unwrap());

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url.path(), "/api/3/contacts");
        assert_eq!(
            query_param(&requests[0], "email").as_deref(),
            Some("jane@example.com")
        );
        assert_eq!(header(&requests[0], "api-token"), Some("api-key"));
        assert_eq!(requests[1].url.host_str(), Some("track.test"));
    }

    #[tokio::test]
    async fn unknown_contact_is_unconfirmed_without_tracking() {
        let client = MockClient::replying(vec![not_found("contacts")]);

        let err = adapter(Arc::clone(&client))
            .validate(&trial_started())
            .await
            .unwrap_err();

        assert!(matches!(err, AdapterError::Unconfirmed { .. }));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn rejected_track_is_unconfirmed() {
        let client = MockClient::replying(vec![
            found("contacts", "42"),
            json_response(200, &json!({"success": 0})),
        ]);

        let err = adapter(client).validate(&trial_started()).await.unwrap_err();

        assert!(matches!(err, AdapterError::Unconfirmed { .. }));
    }

    #[tokio::test]
    async fn missing_url_is_precondition() {
        let client = MockClient::ok();
        let event = Event::new("trial", "").with_prop("email", "jane@example.com");

        let err = adapter(Arc::clone(&client)).validate(&event).await.unwrap_err();

        assert!(matches!(err, AdapterError::Precondition { .. }));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn missing_name_is_precondition() {
        let client = MockClient::ok();
        let event = Event::new("trial", "https://example.com/pricing")
            .with_prop("email", "jane@example.com");

        let err = adapter(Arc::clone(&client)).validate(&event).await.unwrap_err();

        assert!(matches!(err, AdapterError::Precondition { .. }));
        assert_eq!(client.calls(), 0);
    }
}

mod contacts {
    use super::*;

    #[tokio::test]
    async fn create_contact_posts_json_with_api_token() {
        let client = MockClient::replying(vec![json_response(
            201,
            &json!({"contact": {"id": "42"}}),
        )]);
        let contact = Contact::new("jane@example.com").with_name("Jane", "Doe");

        let id = adapter(Arc::clone(&client))
            .create_contact(&contact)
            .await
            .unwrap();

        assert_eq!(id.as_deref(), Some("42"));
        let req = client.last_request();
        assert_eq!(req.url.as_str(), "https://acme.test/api/3/contacts");
        assert_eq!(header(&req, "api-token"), Some("api-key"));
        assert_eq!(header(&req, "content-type"), Some("application/json"));
        assert_eq!(
            json_body(&req),
            json!({"contact": {"email": "jane@example.com", "firstName": "Jane", "lastName": "Doe"}})
        );
    }

    #[tokio::test]
    async fn update_contact_puts_by_id() {
        let client = MockClient::ok();

        adapter(Arc::clone(&client))
            .update_contact("42", &Contact::new("jane@example.com").with_phone("555"))
            .await
            .unwrap();

        let req = client.last_request();
        assert_eq!(req.method, http::Method::PUT);
        assert_eq!(req.url.path(), "/api/3/contacts/42");
        assert_eq!(json_body(&req)["contact"]["phone"], "555");
    }

    #[tokio::test]
    async fn delete_contact_looks_up_then_deletes() {
        let client = MockClient::replying(vec![found("contacts", "42")]);

        assert!(
            adapter(Arc::clone(&client))
                .delete_contact("jane@example.com")
                .await
                .unwrap()
        );

        let req = client.last_request();
        assert_eq!(req.method, http::Method::DELETE);
        assert_eq!(req.url.path(), "/api/3/contacts/42");
        assert_eq!(header(&req, "content-type"), None);
    }

    #[tokio::test]
    async fn delete_missing_contact_is_false() {
        let client = MockClient::replying(vec![not_found("contacts")]);

        assert!(
            !adapter(Arc::clone(&client))
                .delete_contact("ghost@example.com")
                .await
                .unwrap()
        );
        assert_eq!(client.calls(), 1);
    }
}

mod accounts {
    use super::*;

    #[tokio::test]
    async fn account_exists_searches_by_name() {
        let client = MockClient::replying(vec![found("accounts", "9")]);

        let id = adapter(Arc::clone(&client))
            .account_exists("Acme")
            .await
            .unwrap();

        assert_eq!(id.as_deref(), Some("9"));
        let req = client.last_request();
        assert_eq!(req.url.path(), "/api/3/accounts");
        assert_eq!(query_param(&req, "search").as_deref(), Some("Acme"));
    }

    #[tokio::test]
    async fn create_and_delete_account() {
        let client = MockClient::replying(vec![json_response(
            201,
            &json!({"account": {"id": 9}}),
        )]);
        let campaign = adapter(Arc::clone(&client));

        let id = campaign.create_account("Acme", "https://acme.test").await.unwrap();
        campaign.delete_account("9").await.unwrap();

        assert_eq!(id.as_deref(), Some("9"));
        let requests = client.requests();
        assert_eq!(
            json_body(&requests[0]),
            json!({"account": {"name": "Acme", "accountUrl": "https://acme.test"}})
        );
        assert_eq!(requests[1].method, http::Method::DELETE);
        assert_eq!(requests[1].url.path(), "/api/3/accounts/9");
    }

    #[tokio::test]
    async fn sync_association_creates_missing_link() {
        let client = MockClient::replying(vec![not_found("accountContacts")]);

        let created = adapter(Arc::clone(&client))
            .sync_association("9", "42", "CTO")
            .await
            .unwrap();

        assert!(created);
        let requests = client.requests();
        assert_eq!(
            query_param(&requests[0], "filters[account]").as_deref(),
            Some("9")
        );
        assert_eq!(
            query_param(&requests[0], "filters[contact]").as_deref(),
            Some("42")
        );
        assert_eq!(requests[1].method, http::Method::POST);
        assert_eq!(
            json_body(&requests[1]),
            json!({"accountContact": {"contact": "42", "account": "9", "jobTitle": "CTO"}})
        );
    }

    #[tokio::test]
    async fn sync_association_updates_existing_link() {
        let client = MockClient::replying(vec![found("accountContacts", "77")]);

        let created = adapter(Arc::clone(&client))
            .sync_association("9", "42", "CEO")
            .await
            .unwrap();

        assert!(!created);
        let req = client.last_request();
        assert_eq!(req.method, http::Method::PUT);
        assert_eq!(req.url.path(), "/api/3/accountContacts/77");
        assert_eq!(json_body(&req), json!({"accountContact": {"jobTitle": "CEO"}}));
    }
}

mod lists_and_tags {
    use super::*;

    #[tokio::test]
    async fn add_to_list_subscribes_contact() {
        let client = MockClient::ok();

        adapter(Arc::clone(&client)).add_to_list("42", "3").await.unwrap();

        let req = client.last_request();
        assert_eq!(req.url.path(), "/api/3/contactLists");
        assert_eq!(
            json_body(&req),
            json!({"contactList": {"list": "3", "contact": "42", "status": 1}})
        );
    }

    #[tokio::test]
    async fn add_tag_links_tag() {
        let client = MockClient::ok();

        adapter(Arc::clone(&client)).add_tag("42", "8").await.unwrap();

        let req = client.last_request();
        assert_eq!(req.url.path(), "/api/3/contactTags");
        assert_eq!(json_body(&req), json!({"contactTag": {"contact": "42", "tag": "8"}}));
    }

    #[tokio::test]
    async fn extras_are_strict() {
        let client = MockClient::replying(vec![json_response(
            422,
            &json!({"message": "Tag does not exist"}),
        )]);

        let err = adapter(client).add_tag("42", "404").await.unwrap_err();

        assert_eq!(err.status(), 422);
    }
}
