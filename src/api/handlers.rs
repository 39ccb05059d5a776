// src/api/handlers.rs
use actix_web::{web, HttpResponse};
use chrono::Utc;
use std::sync::Arc;

use crate::error::EngineError;
use crate::models::{
    ApplyReferralRequest, BalanceResponse, CallActionRequest, HealthResponse, ListenerProfile,
    MatchResponse, OnboardListenerRequest, OnboardSeekerRequest, RechargeRequest, SeekerProfile,
    StartCallRequest, TalkNowRequest, TipRequest, ToggleOnlineRequest, WithdrawRequest,
};
use crate::services::{CallLifecycle, MatchingEngine, RateLimiter, ReferralEngine, WalletService};
use crate::store::Store;

const RECHARGE_LIMIT: u32 = 10;
const RECHARGE_WINDOW_HOURS: i64 = 1;

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "huddle-engine".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Onboarding creates the profile and its wallet in one step; every other
/// route requires both to exist.
pub async fn onboard_seeker(
    req: web::Json<OnboardSeekerRequest>,
    store: web::Data<Arc<Store>>,
    wallet: web::Data<Arc<WalletService>>,
) -> Result<HttpResponse, EngineError> {
    let mut profile = SeekerProfile::new(
        &req.user_id,
        &req.name,
        req.languages.clone(),
        req.intent_tags.clone(),
    );
    profile.device_fingerprint = req.device_fingerprint.clone();

    if !store.seekers.insert(&req.user_id, profile.clone()) {
        return Err(EngineError::Conflict("seeker already onboarded".into()));
    }
    wallet.ensure_wallet(&req.user_id);

    tracing::info!("Seeker {} onboarded", req.user_id);
    Ok(HttpResponse::Created().json(profile))
}

/// The response carries the generated referral code; listeners come up
/// offline until they toggle themselves available.
pub async fn onboard_listener(
    req: web::Json<OnboardListenerRequest>,
    store: web::Data<Arc<Store>>,
    wallet: web::Data<Arc<WalletService>>,
) -> Result<HttpResponse, EngineError> {
    let mut profile = ListenerProfile::new(
        &req.user_id,
        &req.name,
        req.languages.clone(),
        req.topic_tags.clone(),
    );
    profile.device_fingerprint = req.device_fingerprint.clone();

    if !store.listeners.insert(&req.user_id, profile.clone()) {
        return Err(EngineError::Conflict("listener already onboarded".into()));
    }
    wallet.ensure_earnings(&req.user_id);

    tracing::info!("Listener {} onboarded", req.user_id);
    Ok(HttpResponse::Created().json(profile))
}

pub async fn talk_now(
    req: web::Json<TalkNowRequest>,
    matching: web::Data<Arc<MatchingEngine>>,
) -> Result<HttpResponse, EngineError> {
    let listener = matching
        .match_listener(&req.seeker_id, &req.excluded_listener_ids)
        .await?;
    Ok(HttpResponse::Ok().json(MatchResponse::from(&listener)))
}

pub async fn start_call(
    req: web::Json<StartCallRequest>,
    lifecycle: web::Data<Arc<CallLifecycle>>,
) -> Result<HttpResponse, EngineError> {
    let call = lifecycle.start(&req).await?;
    Ok(HttpResponse::Created().json(call))
}

pub async fn get_call(
    path: web::Path<String>,
    store: web::Data<Arc<Store>>,
) -> Result<HttpResponse, EngineError> {
    let call = store.calls.get(&path).ok_or(EngineError::NotFound("call"))?;
    Ok(HttpResponse::Ok().json(call))
}

pub async fn accept_call(
    path: web::Path<String>,
    req: web::Json<CallActionRequest>,
    lifecycle: web::Data<Arc<CallLifecycle>>,
) -> Result<HttpResponse, EngineError> {
    let call = lifecycle.accept(&path, &req.user_id).await?;
    Ok(HttpResponse::Ok().json(call))
}

pub async fn reject_call(
    path: web::Path<String>,
    req: web::Json<CallActionRequest>,
    lifecycle: web::Data<Arc<CallLifecycle>>,
) -> Result<HttpResponse, EngineError> {
    let summary = lifecycle.reject(&path, &req.user_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

pub async fn end_call(
    path: web::Path<String>,
    req: web::Json<CallActionRequest>,
    lifecycle: web::Data<Arc<CallLifecycle>>,
) -> Result<HttpResponse, EngineError> {
    let summary = lifecycle.end(&path, &req.user_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

pub async fn tip_listener(
    path: web::Path<String>,
    req: web::Json<TipRequest>,
    store: web::Data<Arc<Store>>,
    wallet: web::Data<Arc<WalletService>>,
) -> Result<HttpResponse, EngineError> {
    let call = store.calls.get(&path).ok_or(EngineError::NotFound("call"))?;
    if call.seeker_id != req.user_id {
        return Err(EngineError::Authorization("only the seeker may tip".into()));
    }
    let balance = wallet.tip(&call.seeker_id, &call.listener_id, req.amount, Some(&call.id))?;
    Ok(HttpResponse::Ok().json(BalanceResponse { balance }))
}

pub async fn wallet_balance(
    path: web::Path<String>,
    wallet: web::Data<Arc<WalletService>>,
) -> Result<HttpResponse, EngineError> {
    let balance = wallet.balance(&path)?;
    Ok(HttpResponse::Ok().json(BalanceResponse { balance }))
}

pub async fn recharge_wallet(
    path: web::Path<String>,
    req: web::Json<RechargeRequest>,
    wallet: web::Data<Arc<WalletService>>,
    limiter: web::Data<Arc<RateLimiter>>,
) -> Result<HttpResponse, EngineError> {
    if !limiter.allow(
        "wallet_recharge",
        &path,
        RECHARGE_LIMIT,
        chrono::Duration::hours(RECHARGE_WINDOW_HOURS),
    ) {
        return Err(EngineError::RateLimited("wallet recharges".into()));
    }
    let balance = wallet.recharge(&path, &req.pack_id)?;
    Ok(HttpResponse::Ok().json(BalanceResponse { balance }))
}

pub async fn wallet_transactions(
    path: web::Path<String>,
    wallet: web::Data<Arc<WalletService>>,
) -> Result<HttpResponse, EngineError> {
    Ok(HttpResponse::Ok().json(wallet.transactions(&path)))
}

pub async fn listener_heartbeat(
    path: web::Path<String>,
    store: web::Data<Arc<Store>>,
) -> Result<HttpResponse, EngineError> {
    let found = store
        .listeners
        .update(&path, |l| l.last_heartbeat = Some(Utc::now()));
    if !found {
        return Err(EngineError::NotFound("listener profile"));
    }
    Ok(HttpResponse::Ok().finish())
}

pub async fn listener_toggle_online(
    path: web::Path<String>,
    req: web::Json<ToggleOnlineRequest>,
    store: web::Data<Arc<Store>>,
) -> Result<HttpResponse, EngineError> {
    let found = store.listeners.update(&path, |l| {
        l.online = req.online;
        if req.online {
            l.last_heartbeat = Some(Utc::now());
        }
    });
    if !found {
        return Err(EngineError::NotFound("listener profile"));
    }
    Ok(HttpResponse::Ok().finish())
}

pub async fn listener_earnings(
    path: web::Path<String>,
    store: web::Data<Arc<Store>>,
) -> Result<HttpResponse, EngineError> {
    let earnings = store
        .earnings
        .get(&path)
        .ok_or(EngineError::NotFound("earnings account"))?;
    Ok(HttpResponse::Ok().json(earnings))
}

pub async fn withdraw_earnings(
    path: web::Path<String>,
    req: web::Json<WithdrawRequest>,
    wallet: web::Data<Arc<WalletService>>,
) -> Result<HttpResponse, EngineError> {
    let earnings = wallet.withdraw_earnings(&path, req.amount)?;
    Ok(HttpResponse::Ok().json(earnings))
}

pub async fn apply_referral(
    req: web::Json<ApplyReferralRequest>,
    referral: web::Data<Arc<ReferralEngine>>,
) -> Result<HttpResponse, EngineError> {
    let applied = referral.apply(&req.listener_id, &req.referral_code)?;
    Ok(HttpResponse::Created().json(applied))
}

pub async fn referral_summary(
    path: web::Path<String>,
    referral: web::Data<Arc<ReferralEngine>>,
) -> Result<HttpResponse, EngineError> {
    Ok(HttpResponse::Ok().json(referral.summary(&path)?))
}
