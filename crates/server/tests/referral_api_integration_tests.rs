use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use database::{DynReferralRepository, MemoryReferralRepository};
use serde_json::{json, Value};
use server::{
    router::AppRouter,
    services::{referral::ReferralPolicy, Services},
};
use std::sync::Arc;
use tower::ServiceExt;

/// 集成测试 - 路由、控制器、账本和内存仓库的端到端流程
///
/// 使用 MemoryReferralRepository，不需要 MongoDB

fn test_app_with(policy: ReferralPolicy) -> (Arc<MemoryReferralRepository>, Router) {
    let repository = Arc::new(MemoryReferralRepository::new());
    let services = Services::from_repository(repository.clone() as DynReferralRepository, policy);
    (repository, AppRouter::new(services))
}

fn test_app() -> (Arc<MemoryReferralRepository>, Router) {
    test_app_with(ReferralPolicy::default())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    (status, value)
}

async fn issue_code(app: &Router, user: &str, name: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/referral/codes",
        Some(json!({ "ownerUserId": user, "ownerName": name, "ownerEmail": format!("{}@example.com", user) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body
}

async fn redeem(app: &Router, code: &str, user: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/api/v1/referral/redeem",
        Some(json!({ "code": code, "redeemerUserId": user, "redeemerName": user })),
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let (_, app) = test_app();

    let (status, body) = send(&app, "GET", "/api/v1", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("Server is running! 🚀".to_string()));
}

#[tokio::test]
async fn test_issue_and_lookup_code() {
    let (_, app) = test_app();

    let code = issue_code(&app, "u1", "hong").await;
    let again = issue_code(&app, "u1", "hong").await;
    assert_eq!(code["code"], again["code"]);
    assert_eq!(code["ownerUserId"], "u1");
    assert_eq!(code["usageCount"], 0);
    assert_eq!(code["isActive"], true);

    let lower = code["code"].as_str().unwrap().to_lowercase();
    let (status, found) = send(&app, "GET", &format!("/api/v1/referral/codes/{}", lower), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["code"], code["code"]);

    let (status, body) = send(&app, "GET", "/api/v1/referral/codes/UNKNOWN1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "CODE_NOT_FOUND");
}

#[tokio::test]
async fn test_redeem_approve_pay_flow() {
    let (repository, app) = test_app();
    let code = issue_code(&app, "u1", "hong").await;
    let code_value = code["code"].as_str().unwrap();

    let (status, usage) = redeem(&app, code_value, "u2").await;
    assert_eq!(status, StatusCode::OK, "{}", usage);
    assert_eq!(usage["status"], "pending");
    assert_eq!(usage["rewardAmount"], 10000);
    let reward_id = usage["rewardId"].as_str().unwrap().to_string();
    assert_eq!(reward_id.len(), 24);
    assert_eq!(usage["id"].as_str().unwrap().len(), 24);

    let (status, body) = redeem(&app, code_value, "u2").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_REDEEMED");
    assert_eq!(body["success"], false);
    assert_eq!(repository.counts().await, (1, 1, 1));

    // pending 状态不能直接支付
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/reward/{}/pay", reward_id),
        Some(json!({ "paymentMethod": "bank_transfer" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_REWARD_STATE");

    let (status, approved) = send(&app, "POST", &format!("/api/v1/reward/{}/approve", reward_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");
    assert_eq!(approved["id"], reward_id.as_str());
    assert!(approved["paidAt"].is_null());

    let (status, paid) = send(
        &app,
        "POST",
        &format!("/api/v1/reward/{}/pay", reward_id),
        Some(json!({ "paymentMethod": "bank_transfer", "paymentDetails": "KB 123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "paid");
    assert!(paid["paidAt"].is_u64());
    assert_eq!(paid["paymentMethod"], "bank_transfer");

    let (status, stats) = send(&app, "GET", "/api/v1/referral/stats/u1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalUsages"], 1);
    assert_eq!(stats["paidUsages"], 1);
    assert_eq!(stats["paidAmount"], 10000);
    assert_eq!(stats["level"], "bronze");

    let (status, usages) = send(&app, "GET", "/api/v1/referral/usages/u1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usages[0]["status"], "paid");

    let (status, redemption) = send(&app, "GET", "/api/v1/referral/redemption/u2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(redemption["referrerCode"], code["code"]);

    let (status, none) = send(&app, "GET", "/api/v1/referral/redemption/u9", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(none.is_null());
}

#[tokio::test]
async fn test_redeem_error_responses() {
    let (_, app) = test_app_with(ReferralPolicy {
        max_usage: 1,
        ..ReferralPolicy::default()
    });
    let code = issue_code(&app, "u1", "hong").await;
    let code_value = code["code"].as_str().unwrap();

    let (status, body) = redeem(&app, code_value, "u1").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "SELF_REFERRAL_FORBIDDEN");

    let (status, body) = redeem(&app, "no-such-code", "u2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_CODE");

    assert_eq!(redeem(&app, code_value, "u2").await.0, StatusCode::OK);
    let (status, body) = redeem(&app, code_value, "u3").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "USAGE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn test_deactivate_and_reactivate_code() {
    let (_, app) = test_app();
    let code = issue_code(&app, "u1", "hong").await;
    let id = code["id"].as_str().unwrap();
    let code_value = code["code"].as_str().unwrap();

    let (status, body) = send(&app, "POST", &format!("/api/v1/referral/codes/{}/deactivate", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isActive"], false);

    let (status, body) = redeem(&app, code_value, "u2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_CODE");

    let (status, body) = send(&app, "POST", &format!("/api/v1/referral/codes/{}/reactivate", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isActive"], true);
    assert_eq!(redeem(&app, code_value, "u2").await.0, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/api/v1/referral/codes/000000000000000000000000/deactivate", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "CODE_NOT_FOUND");
}

#[tokio::test]
async fn test_grant_commission_and_reward_listings() {
    let (_, app) = test_app();
    let top = issue_code(&app, "top", "Top").await;
    assert_eq!(redeem(&app, top["code"].as_str().unwrap(), "middle").await.0, StatusCode::OK);
    let middle = issue_code(&app, "middle", "Middle").await;
    assert_eq!(redeem(&app, middle["code"].as_str().unwrap(), "booker").await.0, StatusCode::OK);

    let (status, rewards) = send(
        &app,
        "POST",
        "/api/v1/reward/commission",
        Some(json!({ "bookingUserId": "booker", "bookingAmount": 100000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rewards.as_array().unwrap().len(), 2);
    assert_eq!(rewards[0]["amount"], 5000);
    assert_eq!(rewards[1]["amount"], 2000);

    let (status, granted) = send(
        &app,
        "POST",
        "/api/v1/reward/grant",
        Some(json!({ "beneficiaryUserId": "top", "amount": 3000, "source": "bonus", "description": "이벤트" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(granted["source"], "bonus");
    assert_eq!(granted["status"], "pending");

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/reward/grant",
        Some(json!({ "beneficiaryUserId": "top", "amount": 0, "source": "bonus" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_AMOUNT");

    // top: 兑换奖励 + 二级佣金 + 奖金
    let (status, top_rewards) = send(&app, "GET", "/api/v1/reward/beneficiary/top", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(top_rewards.as_array().unwrap().len(), 3);

    let (status, pending) = send(&app, "GET", "/api/v1/reward/status/pending", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 5);

    let (status, _) = send(&app, "GET", "/api/v1/reward/status/cancelled", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_request_validation_errors() {
    let (_, app) = test_app();

    let (status, _) = send(&app, "POST", "/api/v1/referral/codes", Some(json!({ "ownerUserId": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/api/v1/referral/redeem", Some(json!({ "code": "ABC" }))).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_store_unavailable_maps_to_503() {
    let (repository, app) = test_app();
    repository.set_unavailable(true);

    let (status, body) = send(&app, "GET", "/api/v1/referral/stats/u1", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "STORE_UNAVAILABLE");
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let (_, app) = test_app();

    let (status, body) = send(&app, "GET", "/api/v1/nothing/here", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}
