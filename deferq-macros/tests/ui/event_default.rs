use deferq_core::event::AppEvent;
use deferq_macros::AppEvent;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, AppEvent)]
struct Tick;

mod nested {
    use deferq_macros::AppEvent;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, AppEvent)]
    pub enum Alarm {
        Ring { at: u64 },
        Snooze,
    }
}

fn main() {
    assert!(Tick::EVENT_TYPE.ends_with("::Tick"));
    assert!(<nested::Alarm as AppEvent>::EVENT_TYPE.ends_with("::nested::Alarm"));
}
