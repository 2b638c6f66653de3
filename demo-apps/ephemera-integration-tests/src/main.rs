use anyhow::Result;
use ephemera_auth::repository::{
    AccountStore, InMemoryUserRepository, MemoryTokenStore, TokenStore, UserRepository,
};
use ephemera_auth::verification::{CodeIntent, Verifier, CODE_TTL};
use ephemera_auth::{AccountService, CredentialError, CredentialHasher, ServiceConfig};
use ephemera_core::{ManualClock, Store, StoreConfig};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stand-in for the real password hasher; marks the password instead of hashing it.
struct DemoHasher;

impl CredentialHasher for DemoHasher {
    fn hash(&self, password: &str) -> Result<String, CredentialError> {
        Ok(format!("demo${}", password.len()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ephemera_integration_tests=info,ephemera_auth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env()?;

    tracing::info!("🧪 Ephemera Integration Tests");
    tracing::info!("   Sweep interval: {}s", config.sweep_interval.as_secs());

    let store = Store::with_config(config.store_config());

    test_basic_operations(&store).await?;
    test_parallel_set_find(&store).await?;
    test_code_lifecycle(&store).await?;
    test_concurrent_consumption(&store).await?;
    test_account_workflow(&store).await?;
    test_expiration().await?;

    store.close();

    tracing::info!("✅ All tests passed!");
    Ok(())
}

/// SET/FIND/DELETE through one-shot dispatch
async fn test_basic_operations(store: &Store) -> Result<()> {
    tracing::info!("Test: Basic Operations");

    let tokens = MemoryTokenStore::new(store.clone());
    let key = format!("basic-test-{}", uuid::Uuid::new_v4());

    tokens
        .set(&key, b"hello world".to_vec(), Duration::ZERO)
        .wait()
        .await?;

    let found = tokens.find(&key).wait().await?;
    assert_eq!(found.as_deref(), Some(&b"hello world"[..]), "Value should match");

    tokens.delete(&key).wait().await?;
    // Deleting twice is fine
    tokens.delete(&key).wait().await?;

    let found = tokens.find(&key).wait().await?;
    assert!(found.is_none(), "Key should not be found after delete");

    tracing::info!("   ✓ Basic operations work correctly");
    Ok(())
}

/// Many concurrent dispatches; every caller gets its own result back
async fn test_parallel_set_find(store: &Store) -> Result<()> {
    tracing::info!("Test: Parallel SET/FIND (500 concurrent operations)");

    let tokens = Arc::new(MemoryTokenStore::new(store.clone()));
    let start = Instant::now();

    let test_data: Vec<(String, String)> = (0..500)
        .map(|i| {
            (
                format!("parallel-test-{}-{}", i, uuid::Uuid::new_v4()),
                format!("value-{}-{}", i, uuid::Uuid::new_v4()),
            )
        })
        .collect();

    let sets = join_all(test_data.iter().map(|(key, value)| {
        tokens
            .set(key, value.clone().into_bytes(), Duration::from_secs(300))
            .wait()
    }))
    .await;
    for result in sets {
        result?;
    }

    let finds = join_all(test_data.iter().map(|(key, _)| tokens.find(key).wait())).await;

    let mut mismatches = 0;
    for ((key, expected), found) in test_data.iter().zip(finds) {
        if found?.as_deref() != Some(expected.as_bytes()) {
            tracing::error!("   Mismatch for key {}", key);
            mismatches += 1;
        }
    }
    assert_eq!(mismatches, 0, "Found {} mismatched values", mismatches);

    for (key, _) in &test_data {
        tokens.delete(key).wait().await?;
    }

    tracing::info!("   ✓ 500 operations completed in {:?}", start.elapsed());
    Ok(())
}

/// ISSUED → CONSUMED, and no way back
async fn test_code_lifecycle(store: &Store) -> Result<()> {
    tracing::info!("Test: Verification Code Lifecycle");

    let verifier = Verifier::new(Arc::new(MemoryTokenStore::new(store.clone())));

    let code = verifier.issue("a@b.com", CodeIntent::Registration).await?;
    let record = verifier.consume(&code).await?;
    assert_eq!(record.identity, "a@b.com");
    assert_eq!(record.intent, Some(CodeIntent::Registration));

    let second = verifier.consume(&code).await;
    assert!(
        matches!(&second, Err(err) if err.is_invalid_code()),
        "Second consumption should be rejected"
    );

    let malformed = verifier.consume("12345").await;
    assert!(matches!(&malformed, Err(err) if err.is_invalid_code()));

    tracing::info!("   ✓ Codes are single-use");
    Ok(())
}

/// Many callers racing for the same code; exactly one wins
async fn test_concurrent_consumption(store: &Store) -> Result<()> {
    tracing::info!("Test: Concurrent Consumption (50 racers)");

    let verifier = Verifier::new(Arc::new(MemoryTokenStore::new(store.clone())));
    let code = verifier.issue("race@b.com", CodeIntent::ResetPassword).await?;

    let racers = (0..50).map(|_| {
        let verifier = verifier.clone();
        let code = code.clone();
        tokio::spawn(async move { verifier.consume(&code).await })
    });

    let mut winners = 0;
    for outcome in join_all(racers).await {
        match outcome? {
            Ok(_) => winners += 1,
            Err(err) if err.is_invalid_code() => {}
            Err(err) => return Err(err.into()),
        }
    }
    assert_eq!(winners, 1, "Exactly one racer should consume the code");

    tracing::info!("   ✓ One winner out of 50");
    Ok(())
}

/// Registration followed by a password reset
async fn test_account_workflow(store: &Store) -> Result<()> {
    tracing::info!("Test: Account Workflow");

    let users = Arc::new(InMemoryUserRepository::new());
    let service = AccountService::new(
        Verifier::new(Arc::new(MemoryTokenStore::new(store.clone()))),
        AccountStore::new(users.clone()),
        Arc::new(DemoHasher),
    );
    let email = format!("user-{}@example.com", uuid::Uuid::new_v4().simple());

    let code = service
        .send_verification_code(&email, CodeIntent::Registration)
        .await?;
    let user = service.register(&code, "Demo User", "secret").await?;
    assert_eq!(user.email, email);

    let code = service
        .send_verification_code(&email, CodeIntent::ResetPassword)
        .await?;
    service
        .reset_password(&code, "longer-secret", "longer-secret")
        .await?;

    let stored = users.find_by_email(&email).await?;
    assert_eq!(
        stored.map(|user| user.password_hash),
        Some("demo$13".to_string()),
        "Password should be updated"
    );

    tracing::info!("   ✓ Register and reset work end to end");
    Ok(())
}

/// Lazy expiry at 30 minutes, then eviction by the sweeper
async fn test_expiration() -> Result<()> {
    tracing::info!("Test: Expiration");

    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let store = Store::with_clock(
        StoreConfig::default().with_sweep_interval(Duration::from_millis(100)),
        clock.clone(),
    );
    let verifier = Verifier::new(Arc::new(MemoryTokenStore::new(store.clone())));

    let first = verifier.issue("first@b.com", CodeIntent::Registration).await?;
    let second = verifier.issue("second@b.com", CodeIntent::Registration).await?;

    clock.advance(CODE_TTL);
    assert!(!store.contains_key(&first), "Code should read as expired");
    assert_eq!(store.len(), 2, "Expired entries wait for the sweeper");

    clock.advance(Duration::from_secs(1));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(store.is_empty(), "Sweeper should evict expired codes");

    let late = verifier.consume(&second).await;
    assert!(matches!(&late, Err(err) if err.is_invalid_code()));

    store.close();

    tracing::info!("   ✓ Expired codes are rejected and evicted");
    Ok(())
}
