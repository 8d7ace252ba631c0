//! Declarative macros for ergonomic effect construction
//!
//! Reducers in this workspace build the same few shapes over and over: a
//! network call whose result is fed back as an action, a timer, and a timer
//! that must be cancellable on teardown.

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use rollcall_core::async_effect;
///
/// async_effect! {
///     let result = authority.fetch_attendance(&event_id).await;
///     Some(RsvpAction::AttendanceFetched { event_id, result })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use rollcall_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_millis(1200),
///     action: RedemptionAction::CooldownElapsed { cycle }
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

/// Wrap an effect so it is registered under an `EffectId`
///
/// # Example
///
/// ```rust,ignore
/// use rollcall_core::{cancellable, delay};
///
/// cancellable! {
///     id: MINT_REFRESH_TIMER,
///     effect: delay! {
///         duration: interval,
///         action: TokenMintAction::RefreshTick { generation }
///     }
/// }
/// ```
#[macro_export]
macro_rules! cancellable {
    (
        id: $id:expr,
        effect: $effect:expr
    ) => {
        $crate::effect::Effect::Cancellable {
            id: $id,
            effect: ::std::boxed::Box::new($effect),
        }
    };
}
