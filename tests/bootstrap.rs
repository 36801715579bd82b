//! Synchronous bootstrap of element applications.

mod common;

use std::{cell::Cell, rc::Rc};

use common::{create, define_card, field};
use elementum::{SyncPromise, prelude::*, run_sync};
use futures::future;

#[test]
fn ready_initializers_run_before_the_first_render() {
    let runtime = Runtime::new();
    let ran = Rc::new(Cell::new(0));
    let config = {
        let ran = Rc::clone(&ran);
        ApplicationConfig::new().initializer(move |_injector| {
            ran.set(ran.get() + 1);
            let nested = SyncPromise::resolve(2).then(|value| Ok(value * 21));
            async move {
                let value = nested.await.map_err(|reason| anyhow::anyhow!("{reason}"))?;
                assert_eq!(value, 42);
                Ok(())
            }
        })
    };
    let definition = define_card(&runtime, ElementConfig::new(config));
    let (element, host) = create(&definition);

    host.set_connected(true);
    element.connected_callback().expect("bootstrap completes synchronously");
    assert_eq!(ran.get(), 1);
    assert_eq!(field(&host, "instance"), "1");
}

#[test]
fn suspending_initializers_fail_loudly() {
    let runtime = Runtime::new();
    let config = ApplicationConfig::new().initializer(|_injector| future::pending::<anyhow::Result<()>>());
    let definition = define_card(&runtime, ElementConfig::new(config));
    let (element, host) = create(&definition);

    host.set_connected(true);
    let error = element.connected_callback().expect_err("initializer never settles");
    assert!(matches!(error, ElementError::Bootstrap(BootstrapError::WouldSuspend)));
    assert!(element.strategy().is_none());
    assert!(host.content().is_empty());
}

#[test]
fn failing_initializers_surface_their_reason() {
    let runtime = Runtime::new();
    let config = ApplicationConfig::new().initializer(|_injector| async { anyhow::bail!("offline") });
    let definition = define_card(&runtime, ElementConfig::new(config));
    let (element, host) = create(&definition);

    host.set_connected(true);
    match element.connected_callback() {
        Err(ElementError::Bootstrap(BootstrapError::Initializer(reason))) => {
            assert_eq!(reason.to_string(), "offline");
        }
        other => panic!("unexpected connect result: {other:?}"),
    }
}

#[test]
fn run_sync_only_accepts_ready_work() {
    assert_eq!(run_sync(async { 7 }), Ok(7));
    assert!(run_sync(future::pending::<()>()).is_err());
}
