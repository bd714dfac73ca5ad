//! Versioned API handlers.

mod history;
mod sessions;

pub use history::list_history;
pub use sessions::{
    get_pairing, global_status, join_group, schedule_send, send_message, start_session,
};
