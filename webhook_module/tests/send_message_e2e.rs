mod test_support;

use std::sync::Arc;

use axum::http::StatusCode;
use mockito::{Matcher, Server};
use serde_json::json;
use tower::ServiceExt;

use test_support::{body_json, post_json, router_with_sink, test_config};
use webhook_module::adapters::{TemplateParameter, TemplateSettings};
use webhook_module::config::WhatsAppConfig;
use webhook_module::{GatewayConfig, InMemoryRecordSink};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const MESSAGES_PATH: &str = "/v18.0/106540352242922/messages";

fn outbound_config(server: &Server) -> GatewayConfig {
    GatewayConfig {
        whatsapp: WhatsAppConfig {
            access_token: Some("EAAG-test-token".to_string()),
            phone_number_id: Some("106540352242922".to_string()),
            api_base_url: server.url(),
            ..WhatsAppConfig::default()
        },
        ..test_config()
    }
}

fn app(config: GatewayConfig) -> axum::Router {
    router_with_sink(config, Arc::new(InMemoryRecordSink::new()))
}

#[tokio::test]
async fn text_message_is_sent_with_normalized_recipient() -> TestResult {
    let mut server = Server::new_async().await;
    let graph = server
        .mock("POST", MESSAGES_PATH)
        .match_header("authorization", "Bearer EAAG-test-token")
        .match_body(Matcher::PartialJson(json!({
            "messaging_product": "whatsapp",
            "to": "+15550001234",
            "type": "text",
            "text": { "body": "Your quote is ready" }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"messaging_product":"whatsapp","contacts":[{"input":"+15550001234","wa_id":"15550001234"}],"messages":[{"id":"wamid.sent1"}]}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let response = app(outbound_config(&server))
        .oneshot(post_json(
            "/send-message",
            &json!({ "to": "+1 (555) 000-1234", "message": "Your quote is ready" }),
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["messageId"], "wamid.sent1");
    assert_eq!(body["to"], "+15550001234");
    assert_eq!(body["response"]["messages"][0]["id"], "wamid.sent1");
    graph.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn configured_template_replaces_free_text() -> TestResult {
    let mut server = Server::new_async().await;
    let graph = server
        .mock("POST", MESSAGES_PATH)
        .match_body(Matcher::PartialJson(json!({
            "type": "template",
            "template": {
                "name": "renovation_offer",
                "language": { "code": "en" },
                "components": [{
                    "type": "header",
                    "parameters": [{
                        "type": "image",
                        "image": { "link": "https://cdn.example.com/offer.png" }
                    }]
                }, {
                    "type": "body",
                    "parameters": [{ "type": "text", "parameter_name": "name", "text": "Sanjay" }]
                }]
            }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"messages":[{"id":"wamid.tpl"}]}"#)
        .expect(1)
        .create_async()
        .await;

    let mut config = outbound_config(&server);
    config.whatsapp.template = Some(TemplateSettings {
        name: "renovation_offer".to_string(),
        language: "en".to_string(),
        header_image_url: Some("https://cdn.example.com/offer.png".to_string()),
        body_parameters: vec![TemplateParameter {
            name: "name".to_string(),
            text: "Sanjay".to_string(),
        }],
    });

    let response = app(config)
        .oneshot(post_json(
            "/send-message",
            &json!({ "to": "15550001234", "message": "ignored by the template" }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["messageId"], "wamid.tpl");
    graph.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn recipient_override_wins_over_request() -> TestResult {
    let mut server = Server::new_async().await;
    let graph = server
        .mock("POST", MESSAGES_PATH)
        .match_body(Matcher::PartialJson(json!({ "to": "15559990000" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"messages":[{"id":"wamid.override"}]}"#)
        .expect(1)
        .create_async()
        .await;

    let mut config = outbound_config(&server);
    config.whatsapp.recipient_override = Some("15559990000".to_string());

    let response = app(config)
        .oneshot(post_json("/send-message", &json!({ "message": "hello" })))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["to"], "15559990000");
    graph.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn missing_fields_are_bad_request() -> TestResult {
    let server = Server::new_async().await;
    let router = app(outbound_config(&server));

    for body in [
        json!({ "to": "15550001234" }),
        json!({ "message": "hello" }),
        json!({ "to": "  ", "message": "hello" }),
        json!({}),
    ] {
        let response = router.clone().oneshot(post_json("/send-message", &body)).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(body_json(response).await["error"], "Missing required fields");
    }
    Ok(())
}

#[tokio::test]
async fn unconfigured_credentials_are_server_error() -> TestResult {
    let response = app(test_config())
        .oneshot(post_json(
            "/send-message",
            &json!({ "to": "15550001234", "message": "hello" }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "Configuration error");
    Ok(())
}

#[tokio::test]
async fn graph_api_error_status_is_passed_through() -> TestResult {
    let mut server = Server::new_async().await;
    let _graph = server
        .mock("POST", MESSAGES_PATH)
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"error":{"message":"Recipient phone number not in allowed list","code":131030}}"#,
        )
        .create_async()
        .await;

    let response = app(outbound_config(&server))
        .oneshot(post_json(
            "/send-message",
            &json!({ "to": "15550001234", "message": "hello" }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["error"]["code"], 131030);
    Ok(())
}
