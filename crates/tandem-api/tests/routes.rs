use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

use tandem_api::{AppStateInner, router};
use tandem_chat::{ChatService, ChatSettings, SessionRegistry, friends};
use tandem_db::Database;
use tandem_types::api::Claims;
use tandem_types::models::{ChatMessage, ConversationType, FriendRequestContent, MessageContent};

const SECRET: &str = "route-test-secret";

struct TestApp {
    app: Router,
    chat: ChatService,
    ann: i64,
    ben: i64,
}

fn test_app() -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let ann = db.create_user("ann", "Ann").unwrap();
    let ben = db.create_user("ben", "Ben").unwrap();
    let chat = ChatService::new(db, SessionRegistry::new(), ChatSettings::default());
    let app = router(Arc::new(AppStateInner {
        chat: chat.clone(),
        jwt_secret: SECRET.to_string(),
    }));
    TestApp { app, chat, ann, ben }
}

fn token_for(user_id: i64) -> String {
    let claims = Claims {
        sub: user_id,
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn request(method: Method, uri: &str, user_id: Option<i64>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token_for(user_id)));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn friend_request(from: i64, to: i64) -> ChatMessage {
    ChatMessage {
        message_id: 0,
        conversation_type: ConversationType::Private,
        conversation_id: None,
        from,
        to,
        reply_to: None,
        content: MessageContent::FriendRequest(FriendRequestContent::default()),
        sent_at: None,
    }
}

#[tokio::test]
async fn routes_require_a_valid_token() {
    let t = test_app();

    let response = t.app.clone().oneshot(request(Method::GET, "/chats", None, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let bad = Request::builder()
        .uri("/chats")
        .header(header::AUTHORIZATION, "Bearer garbage")
        .body(Body::empty())
        .unwrap();
    let response = t.app.oneshot(bad).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn accept_then_list_then_unfriend() {
    let t = test_app();
    t.chat.submit(t.ben, friend_request(t.ben, t.ann)).unwrap();

    let response = t
        .app
        .clone()
        .oneshot(request(
            Method::POST,
            "/friends/accept",
            Some(t.ann),
            Some(json!({ "originUserId": t.ben })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["alreadyFriends"], false);
    assert_eq!(body["greeting"]["from"], t.ann);

    let response = t
        .app
        .clone()
        .oneshot(request(Method::GET, "/chats", Some(t.ben), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let chats = body["chats"].as_array().unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["type"], "private");
    assert_eq!(chats[0]["info"]["userId"], t.ann);
    assert_eq!(chats[0]["info"]["unreadCount"], 1);

    let uri = format!("/friends/{}", t.ben);
    let response = t
        .app
        .clone()
        .oneshot(request(Method::DELETE, &uri, Some(t.ann), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!friends::are_friends(t.chat.db(), t.ann, t.ben).unwrap());

    let response = t
        .app
        .oneshot(request(Method::DELETE, &uri, Some(t.ann), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn accept_without_request_is_not_found() {
    let t = test_app();
    let response = t
        .app
        .oneshot(request(
            Method::POST,
            "/friends/accept",
            Some(t.ann),
            Some(json!({ "originUserId": t.ben })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
