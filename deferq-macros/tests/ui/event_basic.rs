use deferq_core::event::AppEvent;
use deferq_macros::AppEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, AppEvent)]
#[app_event(type_id = "calendar.Reminder")]
struct Reminder {
    note: String,
}

fn main() {
    assert_eq!(Reminder::EVENT_TYPE, "calendar.Reminder");
    let reminder = Reminder {
        note: "stand up".to_string(),
    };
    assert_eq!(reminder.event_type(), "calendar.Reminder");
    assert_eq!(reminder.note, "stand up");
}
