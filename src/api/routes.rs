// src/api/routes.rs
use actix_web::web;
use crate::api::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health_check))
            .route("/seekers/onboard", web::post().to(handlers::onboard_seeker))
            .route("/listeners/onboard", web::post().to(handlers::onboard_listener))
            .route("/match/talk-now", web::post().to(handlers::talk_now))
            .route("/calls", web::post().to(handlers::start_call))
            .route("/calls/{call_id}", web::get().to(handlers::get_call))
            .route("/calls/{call_id}/accept", web::post().to(handlers::accept_call))
            .route("/calls/{call_id}/reject", web::post().to(handlers::reject_call))
            .route("/calls/{call_id}/end", web::post().to(handlers::end_call))
            .route("/calls/{call_id}/tip", web::post().to(handlers::tip_listener))
            .route("/wallets/{owner_id}/balance", web::get().to(handlers::wallet_balance))
            .route("/wallets/{owner_id}/recharge", web::post().to(handlers::recharge_wallet))
            .route("/wallets/{owner_id}/transactions", web::get().to(handlers::wallet_transactions))
            .route("/listeners/{listener_id}/heartbeat", web::post().to(handlers::listener_heartbeat))
            .route("/listeners/{listener_id}/online", web::post().to(handlers::listener_toggle_online))
            .route("/listeners/{listener_id}/earnings", web::get().to(handlers::listener_earnings))
            .route("/listeners/{listener_id}/withdraw", web::post().to(handlers::withdraw_earnings))
            .route("/referrals/apply", web::post().to(handlers::apply_referral))
            .route("/referrals/{listener_id}", web::get().to(handlers::referral_summary)),
    );
}
