use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

/// Variante lecteurs multiples / écrivain unique (topologie, snapshot métriques).
pub type SharedRw<T> = Arc<RwLock<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

pub fn new_rw_state<T>(value: T) -> SharedRw<T> {
    Arc::new(RwLock::new(value))
}
