pub mod subscribe;

pub use subscribe::Unsubscribe;
