use std::future::Future;
use std::sync::Arc;

use crate::event::{Event, EventKind};
use crate::slot::InvocationSlot;
use crate::BoxError;

/// A target that exposes an invocation point for events of kind `K`.
///
/// Implemented by [`dispatch_table!`](crate::dispatch_table), once per
/// declared event kind.
pub trait Dispatches<K: EventKind> {
    fn slot(&self) -> &InvocationSlot<K>;
    fn slot_mut(&mut self) -> &mut InvocationSlot<K>;
}

/// Register `callback` for events of kind `K` on `target`.
///
/// Listeners run in registration order. Registration needs exclusive access
/// to the target, so it happens before the target starts serving calls.
pub fn listen<K, T, F, Fut>(target: &mut T, callback: F)
where
    K: EventKind,
    T: Dispatches<K> + ?Sized,
    F: Fn(Event<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Event<K>, BoxError>> + Send + 'static,
{
    tracing::debug!(event = K::NAME, "listener registered");
    target
        .slot_mut()
        .push(Arc::new(move |event| Box::pin(callback(event))));
}

/// Declare a dispatch target: a struct with one invocation point per event
/// kind.
///
/// For every `field: Kind` entry the macro generates a passthrough slot, an
/// `async fn field(&self, payload, context)` invocation method and a
/// [`Dispatches<Kind>`](crate::Dispatches) impl. `EVENTS` lists the declared
/// event names in order. Declaring the same kind twice fails to compile.
#[macro_export]
macro_rules! dispatch_table {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident : $kind:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $field: $crate::InvocationSlot<$kind>, )*
        }

        impl $name {
            /// Names of the events this target dispatches.
            pub const EVENTS: &'static [&'static str] = &[
                $( <$kind as $crate::EventKind>::NAME ),*
            ];

            /// A target with every invocation point set to passthrough.
            pub fn new() -> Self {
                Self {
                    $( $field: $crate::InvocationSlot::Passthrough, )*
                }
            }

            $(
                $(#[$field_meta])*
                pub async fn $field(
                    &self,
                    payload: <$kind as $crate::EventKind>::Payload,
                    context: <$kind as $crate::EventKind>::Context,
                ) -> ::std::result::Result<<$kind as $crate::EventKind>::Payload, $crate::BoxError> {
                    self.$field.dispatch(payload, context).await
                }
            )*
        }

        impl ::std::default::Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ::std::clone::Clone for $name {
            fn clone(&self) -> Self {
                Self {
                    $( $field: ::std::clone::Clone::clone(&self.$field), )*
                }
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($name))
                    $( .field(stringify!($field), &self.$field) )*
                    .finish()
            }
        }

        $(
            impl $crate::Dispatches<$kind> for $name {
                fn slot(&self) -> &$crate::InvocationSlot<$kind> {
                    &self.$field
                }

                fn slot_mut(&mut self) -> &mut $crate::InvocationSlot<$kind> {
                    &mut self.$field
                }
            }
        )*
    };
}
