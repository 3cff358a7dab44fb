//! By-type application state.
//!
//! Values registered with [`Arpia::state`](crate::app::Arpia::state) are
//! stored here and retrieved by type from handlers via
//! [`Ctx::state`](crate::context::RequestContext::state).

use std::any::{Any, TypeId};
use std::collections::HashMap;

#[derive(Default)]
pub struct AppState {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }
}
