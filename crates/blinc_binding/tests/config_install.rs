//! Installing a process-wide config
//!
//! Lives in its own test binary: the installed config is global.

use blinc_binding::prelude::*;
use blinc_binding::{diagnostics, BindingConfig, BindingError};

#[test]
fn test_installed_config_drives_runtime() {
    let config = BindingConfig::from_toml_str(
        r#"
        [diagnostics]
        warn_unscoped_store = false
        retain_check = false

        [delivery]
        inline_on_primary = false
        "#,
    )
    .unwrap();
    config.clone().install().unwrap();

    assert_eq!(BindingConfig::current(), &config);
    assert!(matches!(
        BindingConfig::default().install(),
        Err(BindingError::ConfigInstalled)
    ));

    // Delivery: queues no longer run inline on their owner thread
    let queue = PrimaryQueue::new();
    let source = MutableBinding::new(1);
    let bounced = source.decorated_with(
        &blinc_binding::Decorator::new(Decorations::BOUNCES_TO_PRIMARY_THREAD).on_queue(queue.clone()),
    );
    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&seen);
    let _sub = bounced.subscribe(move |v: &i32| sink.lock().unwrap().push(*v));
    assert!(seen.lock().unwrap().is_empty());
    queue.drain().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1]);

    // Diagnostics: unscoped stores are still counted, only the warning is off
    let before = diagnostics::stats().unscoped_stores;
    AnyCancellable::empty().store();
    assert_eq!(diagnostics::stats().unscoped_stores, before + 1);
}
