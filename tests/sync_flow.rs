mod support;

use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use support::{eventually, Backend};
use user_desk::config::USERS_TOPIC;
use user_desk::model::{Action, PushEvent, User};
use user_desk::push::PushChannel;
use user_desk::reconciler::Reconciler;
use user_desk::transport::UserApi;
use user_desk::ui::ManagementPage;

fn ann() -> User {
    User::with_id(1, "A", "1")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshot_then_broadcasts_converge() -> anyhow::Result<()> {
    let backend = Backend::start(vec![ann()]).await;
    let config = backend.config();
    let channel = PushChannel::from_config(&config)?;
    channel.connect().await?;

    let reconciler = Reconciler::new(UserApi::from_config(&config)?);
    let _subscription = reconciler.mount(&channel, USERS_TOPIC).await?;
    assert_eq!(reconciler.snapshot().users(), [ann()]);
    sleep(Duration::from_millis(100)).await;

    // another client edits through REST; only the broadcast reaches us
    let other = UserApi::from_config(&config)?;
    other.create(&User::new("B", "2")).await?;
    assert!(
        eventually(|| reconciler.snapshot().users() == [User::with_id(2, "B", "2"), ann()]).await
    );

    other.update(&User::with_id(1, "A2", "9")).await?;
    assert!(
        eventually(|| {
            reconciler.snapshot().users()
                == [User::with_id(2, "B", "2"), User::with_id(1, "A2", "9")]
        })
        .await
    );

    other.remove(2).await?;
    assert!(eventually(|| reconciler.snapshot().users() == [User::with_id(1, "A2", "9")]).await);

    channel.disconnect().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_broadcasts_are_dropped() -> anyhow::Result<()> {
    let backend = Backend::start(vec![ann()]).await;
    let config = backend.config();
    let channel = PushChannel::from_config(&config)?;
    channel.connect().await?;

    let reconciler = Reconciler::new(UserApi::from_config(&config)?);
    let _subscription = reconciler.mount(&channel, USERS_TOPIC).await?;
    sleep(Duration::from_millis(100)).await;

    backend.broadcast_raw("not json");
    backend.broadcast_raw(r#"{"action":"explode","user":{"id":1,"name":"A","phone":"1"}}"#);
    backend.broadcast_raw(r#"{"action":"delete"}"#);
    backend.broadcast_raw(r#"{"action":"add","user":{"id":3,"name":"C","phone":"3"}}"#);

    // the well-formed event behind the bad ones still lands
    assert!(
        eventually(|| reconciler.snapshot().users() == [User::with_id(3, "C", "3"), ann()]).await
    );
    assert!(channel.is_connected());

    channel.disconnect().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_list_snapshot_is_empty() -> anyhow::Result<()> {
    let backend = Backend::start(vec![ann()]).await;
    backend.set_list_body(json!({ "error": "database unavailable" }));

    let reconciler = Reconciler::new(UserApi::from_config(&backend.config())?);
    reconciler.apply_event(&PushEvent::new(Action::Add, User::with_id(7, "stale", "0")));
    reconciler.load_snapshot().await;
    assert!(reconciler.snapshot().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshot_with_bad_element_is_empty() -> anyhow::Result<()> {
    let backend = Backend::start(vec![ann()]).await;
    let reconciler = Reconciler::new(UserApi::from_config(&backend.config())?);
    reconciler.load_snapshot().await;
    assert_eq!(reconciler.snapshot().users(), [ann()]);

    backend.set_list_body(json!([{ "id": 1, "name": "A", "phone": "1" }, 42]));
    reconciler.load_snapshot().await;
    assert!(reconciler.snapshot().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn requests_do_not_touch_the_list() -> anyhow::Result<()> {
    let backend = Backend::start(vec![ann()]).await;
    backend.set_broadcasts(false);

    let reconciler = Reconciler::new(UserApi::from_config(&backend.config())?);
    reconciler.load_snapshot().await;

    reconciler.request_create(User::new("B", "2")).await?;
    reconciler.request_update(User::with_id(1, "A2", "9")).await?;

    assert_eq!(
        backend.users(),
        vec![User::with_id(1, "A2", "9"), User::with_id(2, "B", "2")]
    );
    assert_eq!(reconciler.snapshot().users(), [ann()]);

    // a failing request is swallowed
    reconciler.request_delete(99).await?;
    assert_eq!(reconciler.snapshot().users(), [ann()]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn page_flows_round_trip_through_backend() -> anyhow::Result<()> {
    let backend = Backend::start(vec![ann()]).await;
    let config = backend.config();
    let channel = PushChannel::from_config(&config)?;
    channel.connect().await?;

    let mut page = ManagementPage::new(Reconciler::new(UserApi::from_config(&config)?));
    page.mount(&channel, USERS_TOPIC).await?;
    assert!(page.is_mounted());
    assert_eq!(page.users(), vec![ann()]);
    sleep(Duration::from_millis(100)).await;

    page.handle_add();
    if let Some(form) = page.form_mut() {
        form.set_name("B");
        form.set_phone("2");
    }
    page.submit_form()?;
    assert!(page.form().is_none());
    assert!(eventually(|| page.users() == vec![User::with_id(2, "B", "2"), ann()]).await);

    page.handle_edit(&ann());
    if let Some(form) = page.form_mut() {
        form.set_phone("42");
    }
    page.submit_form()?;
    assert!(eventually(|| page.users()[1] == User::with_id(1, "A", "42")).await);

    page.handle_delete_click(&User::with_id(2, "B", "2"));
    assert!(page.confirm_dialog().is_open());
    page.handle_confirm_delete();
    assert!(eventually(|| page.users() == vec![User::with_id(1, "A", "42")]).await);

    page.unmount(&channel)?;
    assert!(!page.is_mounted());
    assert_eq!(channel.subscription_count(), 0);

    // nothing arrives after unmount
    sleep(Duration::from_millis(100)).await;
    UserApi::from_config(&config)?.create(&User::new("late", "0")).await?;
    sleep(Duration::from_millis(300)).await;
    assert_eq!(page.users(), vec![User::with_id(1, "A", "42")]);

    channel.disconnect().await;
    Ok(())
}
