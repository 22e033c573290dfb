// markshelf services
// Services wrap the outside world: session state, link metadata, and settings.

pub mod auth;
pub mod metadata;
pub mod settings_engine;
