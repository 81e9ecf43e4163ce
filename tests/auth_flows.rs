//! End-to-end flows against a real Postgres instance.
//!
//! Requires DATABASE_URL; each test skips with a notice when it is absent so
//! the suite stays green on machines without the database. Migrations run on
//! every setup (idempotent). Phone numbers are randomized per test so runs
//! never collide with earlier data.

use auth_core::config::{OtpSettings, RateLimitSettings, TokenSettings};
use auth_core::{
    db, AttemptCounter, AuthError, AuthService, InProcessAttemptCounter, OtpSendOutcome,
    OtpService, RequestMeta, RequestVerifier, Role, TokenSigner,
};
use rand::Rng;
use sqlx::PgPool;
use std::sync::Arc;

struct TestEnv {
    pool: PgPool,
    auth: AuthService,
    verifier: RequestVerifier,
    attempts: Arc<InProcessAttemptCounter>,
}

fn token_settings() -> TokenSettings {
    TokenSettings {
        access_secret: "integration-access-secret".to_string(),
        refresh_secret: "integration-refresh-secret".to_string(),
        reset_secret: "integration-reset-secret".to_string(),
        access_ttl_secs: 900,
        refresh_ttl_secs: 60 * 60 * 24 * 30,
        reset_ttl_secs: 600,
    }
}

async fn setup() -> Option<TestEnv> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping integration test");
            return None;
        }
    };

    let _ = auth_core::init_tracing();

    let pool = PgPool::connect(&url)
        .await
        .expect("should connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations should apply");

    let signer = TokenSigner::new(&token_settings());
    let attempts = Arc::new(InProcessAttemptCounter::new(&RateLimitSettings {
        max_attempts: 5,
        window_secs: 900,
    }));
    let otp = OtpService::new(
        pool.clone(),
        &OtpSettings {
            ttl_secs: 300,
            max_verify_attempts: 5,
        },
    );
    let auth = AuthService::new(
        pool.clone(),
        signer.clone(),
        attempts.clone() as Arc<dyn AttemptCounter>,
        otp,
    );
    let verifier = RequestVerifier::new(pool.clone(), signer);

    Some(TestEnv {
        pool,
        auth,
        verifier,
        attempts,
    })
}

fn random_phone() -> String {
    let mut rng = rand::thread_rng();
    let digits: String = (0..9).map(|_| rng.gen_range(0..10).to_string()).collect();
    format!("+1555{digits}")
}

fn meta() -> RequestMeta {
    RequestMeta::new(Some("10.0.0.1".to_string()), Some("tests/1.0".to_string()))
}

/// Pull the newest unused code for a phone straight from the store, standing
/// in for the delivery channel.
async fn latest_code(pool: &PgPool, phone: &str) -> String {
    sqlx::query_scalar::<_, String>(
        "SELECT code FROM otp_codes WHERE phone = $1 AND used = FALSE ORDER BY created_at DESC LIMIT 1",
    )
    .bind(phone)
    .fetch_one(pool)
    .await
    .expect("a pending code should exist")
}

/// Full happy path up to a registered account
async fn register(env: &TestEnv, phone: &str, password: &str) -> auth_core::AuthTokens {
    let outcome = env.auth.otp().send(phone).await.expect("send should succeed");
    assert!(matches!(outcome, OtpSendOutcome::CodeSent { .. }));

    let code = latest_code(&env.pool, phone).await;
    env.auth
        .otp()
        .verify(phone, &code)
        .await
        .expect("verify should succeed");

    env.auth
        .register(phone, password, &meta())
        .await
        .expect("register should succeed")
}

#[tokio::test]
async fn registration_requires_verified_phone() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();

    let err = env
        .auth
        .register(&phone, "Str0ngPass!", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountNotVerified));
}

#[tokio::test]
async fn registration_flow_and_duplicate_rejection() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();

    let tokens = register(&env, &phone, "Str0ngPass!").await;
    assert!(!tokens.access_token.is_empty());
    assert!(!tokens.refresh_token.is_empty());

    // The phone stays verified, but a second registration must fail
    let err = env
        .auth
        .register(&phone, "An0therPass!", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PhoneAlreadyRegistered));
}

#[tokio::test]
async fn login_and_verifier_round_trip() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();
    register(&env, &phone, "Str0ngPass!").await;

    let tokens = env
        .auth
        .login(&phone, "Str0ngPass!", &meta())
        .await
        .expect("login should succeed");

    let ctx = env
        .verifier
        .authenticate(&tokens.access_token, &meta())
        .await
        .expect("access token should authenticate");
    assert_eq!(ctx.account_id, tokens.account_id);
    assert_eq!(ctx.session_id, tokens.session_id);
}

#[tokio::test]
async fn lockout_after_repeated_failures() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();
    register(&env, &phone, "Str0ngPass!").await;
    env.attempts.clear(&phone);

    for _ in 0..5 {
        let err = env
            .auth
            .login(&phone, "wrong-password", &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    // Sixth attempt is refused before the password is even checked
    let err = env
        .auth
        .login(&phone, "Str0ngPass!", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { .. }));

    // The ledger recorded the locked-out attempt too, with its reason
    let attempts = db::login_attempts::recent_for_phone(&env.pool, &phone, 20)
        .await
        .expect("ledger query should succeed");
    let failures: Vec<_> = attempts.iter().filter(|a| !a.success).collect();
    assert!(failures.len() >= 6);
    assert_eq!(
        failures[0].failure_reason.as_deref(),
        Some("account_locked")
    );
}

#[tokio::test]
async fn refresh_rotation_is_single_use() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();
    let tokens = register(&env, &phone, "Str0ngPass!").await;

    let rotated = env
        .auth
        .refresh(&tokens.refresh_token)
        .await
        .expect("first rotation should succeed");
    assert_ne!(rotated.refresh_token, tokens.refresh_token);
    assert_eq!(rotated.session_id, tokens.session_id);

    // Presenting the consumed token again is flagged as reuse
    let err = env.auth.refresh(&tokens.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshTokenReused));

    // The replacement still works
    env.auth
        .refresh(&rotated.refresh_token)
        .await
        .expect("replacement token should rotate");
}

#[tokio::test]
async fn concurrent_rotation_has_one_winner() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();
    let tokens = register(&env, &phone, "Str0ngPass!").await;

    // Two racing exchanges of the same raw token: the conditional revoke
    // lets exactly one through.
    let (first, second) = tokio::join!(
        env.auth.refresh(&tokens.refresh_token),
        env.auth.refresh(&tokens.refresh_token)
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results
        .into_iter()
        .find_map(|r| r.err())
        .expect("one rotation should lose");
    assert!(matches!(err, AuthError::RefreshTokenReused));
}

#[tokio::test]
async fn concurrent_registration_has_one_winner() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();

    env.auth.otp().send(&phone).await.expect("send should succeed");
    let code = latest_code(&env.pool, &phone).await;
    env.auth
        .otp()
        .verify(&phone, &code)
        .await
        .expect("verify should succeed");

    let meta_a = meta();
    let meta_b = meta();
    let (first, second) = tokio::join!(
        env.auth.register(&phone, "Str0ngPass!", &meta_a),
        env.auth.register(&phone, "Str0ngPass!", &meta_b)
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    // The loser hit either the pre-check or the unique constraint inside
    // the transaction; both paths must leave a ledger row.
    let attempts = db::login_attempts::recent_for_phone(&env.pool, &phone, 10)
        .await
        .expect("ledger query should succeed");
    assert!(attempts.iter().any(|a| !a.success));
}

#[tokio::test]
async fn role_change_takes_effect_at_refresh() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();
    let tokens = register(&env, &phone, "Str0ngPass!").await;
    assert_eq!(tokens.role, Role::Student);

    db::accounts::set_role(&env.pool, tokens.account_id, Role::Instructor)
        .await
        .expect("role change should succeed");

    // The pre-change access token still carries the old role; the next
    // refresh picks up the new one.
    let rotated = env
        .auth
        .refresh(&tokens.refresh_token)
        .await
        .expect("rotation should succeed");
    assert_eq!(rotated.role, Role::Instructor);

    let ctx = env
        .verifier
        .authenticate(&rotated.access_token, &meta())
        .await
        .expect("fresh access token should authenticate");
    assert!(ctx.has_role(Role::Instructor));
}

#[tokio::test]
async fn deactivated_account_is_rejected_everywhere() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();
    let tokens = register(&env, &phone, "Str0ngPass!").await;

    db::accounts::set_active(&env.pool, tokens.account_id, false)
        .await
        .expect("deactivation should succeed");

    let err = env
        .auth
        .login(&phone, "Str0ngPass!", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountInactive));

    let err = env.auth.refresh(&tokens.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountInactive));

    let err = env
        .verifier
        .authenticate(&tokens.access_token, &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountInactive));
}

#[tokio::test]
async fn refresh_rejected_after_logout() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();
    let tokens = register(&env, &phone, "Str0ngPass!").await;

    env.auth
        .logout(tokens.account_id)
        .await
        .expect("logout should succeed");

    let err = env.auth.refresh(&tokens.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::SessionRevoked));

    let err = env
        .verifier
        .authenticate(&tokens.access_token, &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionRevoked));
}

#[tokio::test]
async fn verification_codes_are_single_use() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();

    env.auth.otp().send(&phone).await.expect("send should succeed");
    let code = latest_code(&env.pool, &phone).await;

    env.auth
        .otp()
        .verify(&phone, &code)
        .await
        .expect("first verification should succeed");

    let err = env.auth.otp().verify(&phone, &code).await.unwrap_err();
    assert!(matches!(err, AuthError::OtpAlreadyVerified));
}

#[tokio::test]
async fn newer_code_supersedes_older() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();

    env.auth.otp().send(&phone).await.expect("send should succeed");
    let first = latest_code(&env.pool, &phone).await;

    env.auth.otp().send(&phone).await.expect("resend should succeed");
    let second = latest_code(&env.pool, &phone).await;

    // The older code was invalidated by the resend
    if first != second {
        let err = env.auth.otp().verify(&phone, &first).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::OtpExpired | AuthError::OtpInvalidCode
        ));
    }

    env.auth
        .otp()
        .verify(&phone, &second)
        .await
        .expect("newest code should verify");
}

#[tokio::test]
async fn second_login_supersedes_first_session() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();
    register(&env, &phone, "Str0ngPass!").await;

    let first = env
        .auth
        .login(&phone, "Str0ngPass!", &meta())
        .await
        .expect("first login should succeed");
    let second = env
        .auth
        .login(&phone, "Str0ngPass!", &meta())
        .await
        .expect("second login should succeed");
    assert_ne!(first.session_id, second.session_id);

    // Exactly one active session, the newest
    let sessions = env
        .auth
        .list_sessions(first.account_id)
        .await
        .expect("list should succeed");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, second.session_id);

    // Credentials from the superseded session are dead on both paths
    let err = env
        .verifier
        .authenticate(&first.access_token, &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionRevoked));
    let err = env.auth.refresh(&first.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::SessionRevoked));

    // The live session is unaffected
    env.verifier
        .authenticate(&second.access_token, &meta())
        .await
        .expect("current session should authenticate");

    // The optional gate degrades the dead credential to anonymous instead
    // of failing the request
    let ctx = env
        .verifier
        .optional_authenticate(Some(&first.access_token), &meta())
        .await
        .expect("revoked credential should not error on the optional gate");
    assert!(ctx.is_none());
    let ctx = env
        .verifier
        .optional_authenticate(Some(&second.access_token), &meta())
        .await
        .expect("live credential should pass the optional gate");
    assert!(ctx.is_some());
}

#[tokio::test]
async fn password_reset_rotates_credentials() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();
    let before = register(&env, &phone, "Old-Passw0rd").await;

    let outcome = env
        .auth
        .request_password_reset(&phone)
        .await
        .expect("reset request should succeed");
    assert!(matches!(outcome, OtpSendOutcome::CodeSent { .. }));

    let code = latest_code(&env.pool, &phone).await;
    let reset_token = env
        .auth
        .confirm_password_reset(&phone, &code)
        .await
        .expect("confirmation should yield a reset token");

    let after = env
        .auth
        .reset_password(&reset_token, "New-Passw0rd", &meta())
        .await
        .expect("reset should succeed");
    assert_ne!(after.session_id, before.session_id);

    // Old password and old credentials are dead
    env.attempts.clear(&phone);
    let err = env
        .auth
        .login(&phone, "Old-Passw0rd", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    let err = env.auth.refresh(&before.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::SessionRevoked));

    env.auth
        .login(&phone, "New-Passw0rd", &meta())
        .await
        .expect("new password should log in");
}

#[tokio::test]
async fn reset_token_unusable_for_requests() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();
    register(&env, &phone, "Str0ngPass!").await;

    let outcome = env
        .auth
        .request_password_reset(&phone)
        .await
        .expect("reset request should succeed");
    assert!(matches!(outcome, OtpSendOutcome::CodeSent { .. }));

    let code = latest_code(&env.pool, &phone).await;
    let reset_token = env
        .auth
        .confirm_password_reset(&phone, &code)
        .await
        .expect("confirmation should yield a reset token");

    let err = env
        .verifier
        .authenticate(&reset_token, &meta())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::TokenInvalid | AuthError::TokenExpired
    ));
    let err = env.auth.refresh(&reset_token).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid));
}

#[tokio::test]
async fn revoke_session_is_ownership_checked() {
    let Some(env) = setup().await else { return };
    let phone_a = random_phone();
    let phone_b = random_phone();
    let a = register(&env, &phone_a, "Str0ngPass!").await;
    let b = register(&env, &phone_b, "Str0ngPass!").await;

    // Another account cannot revoke a session it does not own
    let err = env
        .auth
        .revoke_session(b.account_id, a.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound));

    // The owner can, and their credentials die with it
    env.auth
        .revoke_session(a.account_id, a.session_id)
        .await
        .expect("owner revocation should succeed");
    let err = env
        .verifier
        .authenticate(&a.access_token, &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionRevoked));
}

#[tokio::test]
async fn weak_passwords_rejected_at_registration() {
    let Some(env) = setup().await else { return };
    let phone = random_phone();

    env.auth.otp().send(&phone).await.expect("send should succeed");
    let code = latest_code(&env.pool, &phone).await;
    env.auth
        .otp()
        .verify(&phone, &code)
        .await
        .expect("verify should succeed");

    let err = env
        .auth
        .register(&phone, "short", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::WeakPassword(_)));
}
