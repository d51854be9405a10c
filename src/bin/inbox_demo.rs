use ryd_inbox::client::backend::AuthProvider;
use ryd_inbox::client::{ClientConfig, InboxService, Session};
use ryd_inbox::common::{BackendError, Role, SignUp};
use ryd_inbox::server::{BackendConfig, LocalBackend};
use ryd_inbox::utils::logger::init_logger;
use std::sync::Arc;

async fn account(backend: &LocalBackend, username: &str, role: Role) -> anyhow::Result<Session> {
    let email = format!("{}@ryd.local", username);
    let password = format!("{}-demo-pass", username);
    let grant = match backend.sign_in(&email, &password).await {
        Ok(grant) => grant,
        Err(BackendError::Unauthorized(_)) => {
            backend
                .sign_up(SignUp {
                    email,
                    password,
                    username: username.to_string(),
                    display_name: username.to_string(),
                    role,
                })
                .await?
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Session::start(grant))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = BackendConfig::from_env();
    init_logger(&cfg.log_level);
    println!("Using database {}", cfg.database_url);

    let backend = Arc::new(LocalBackend::open(cfg).await?);
    let alice = account(&backend, "alice", Role::Owner).await?;
    let bob = account(&backend, "bob", Role::Tenant).await?;

    let inbox = InboxService::new(backend.clone(), bob.clone(), ClientConfig::from_env());
    inbox.load_threads().await?;

    let found = inbox.search_users("ali").await?;
    let Some(profile) = found.into_iter().find(|p| p.id == *alice.user_id()) else {
        println!("alice not found by search");
        return Ok(());
    };
    let key = inbox.open_conversation(profile, None).await?;
    println!("OPEN -> {}", key);

    let pending = inbox.begin_send("Hi Alice").await?;
    {
        let state = inbox.state();
        let state = state.lock().await;
        let pending_now = state.active().map(|c| c.messages.pending_count()).unwrap_or(0);
        println!("QUEUED -> {} ({} pending)", pending.client_id, pending_now);
    }

    let stored = inbox.finish_send(pending).await?;
    println!("STORED -> {} in thread {}", stored.id, stored.thread_id);

    let state = inbox.state();
    let state = state.lock().await;
    for summary in state.threads().threads() {
        let last = summary.thread.last_message.as_ref().map(|m| m.body.as_str()).unwrap_or("-");
        println!("THREAD {} with {} -> {}", summary.thread.id, summary.other.label(), last);
    }
    Ok(())
}
