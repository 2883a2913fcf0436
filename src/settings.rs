use serde::{Deserialize, Serialize};

/// Slot granularity used whenever the stored value is missing or invalid.
pub const DEFAULT_SLOT_MINUTES: u32 = 15;

/// Mon–Fri, with Sunday at bit 0 and Saturday at bit 6.
pub const DEFAULT_WEEKDAYS_MASK: u32 = 0b0111110;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Start of the daily working window, "HH:MM".
    pub work_start: String,
    /// End of the daily working window, "HH:MM" (exclusive).
    pub work_end: String,
    /// Slot granularity in minutes; governs all slot boundary math.
    pub slot_minutes: u32,
    /// Bitmask of enabled weekdays, Sun=1<<0 .. Sat=1<<6.
    pub weekdays_mask: u32,
    /// Bring the window forward and open the prompt when a slot elapses.
    #[serde(default)]
    pub auto_focus_on_slot: bool,
    /// Notifications play no sound when true.
    #[serde(default = "default_true")]
    pub notification_silent: bool,
    /// Minutes a pending slot may age before the stale reminder fires.
    /// Zero means "derive from slot length" (2x slot_minutes).
    #[serde(default)]
    pub stale_threshold_minutes: u32,
    /// Launch the app on OS login (shell concern, passed through untouched).
    #[serde(default)]
    pub auto_start_on_login: bool,
    /// Consolidate missed-slot notifications while the user is away.
    #[serde(default = "default_true")]
    pub group_notifications: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_start: "08:00".into(),
            work_end: "16:00".into(),
            slot_minutes: DEFAULT_SLOT_MINUTES,
            weekdays_mask: DEFAULT_WEEKDAYS_MASK,
            auto_focus_on_slot: false,
            notification_silent: true,
            stale_threshold_minutes: 45,
            auto_start_on_login: false,
            group_notifications: true,
        }
    }
}

impl Settings {
    /// Coerce invalid fields to safe defaults. Applied at the save boundary
    /// so the scheduling core never sees a zero granularity.
    pub fn normalized(mut self) -> Self {
        if self.slot_minutes == 0 {
            self.slot_minutes = DEFAULT_SLOT_MINUTES;
        }
        self.weekdays_mask &= 0x7f;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_replaces_zero_granularity() {
        let s = Settings {
            slot_minutes: 0,
            ..Settings::default()
        };
        assert_eq!(s.normalized().slot_minutes, DEFAULT_SLOT_MINUTES);
    }

    #[test]
    fn normalized_masks_out_high_bits() {
        let s = Settings {
            weekdays_mask: 0xffff_ffff,
            ..Settings::default()
        };
        assert_eq!(s.normalized().weekdays_mask, 0x7f);
    }

    #[test]
    fn default_window_is_eight_to_four_mon_fri() {
        let s = Settings::default();
        assert_eq!(s.work_start, "08:00");
        assert_eq!(s.work_end, "16:00");
        assert_eq!(s.weekdays_mask, 0b0111110);
        assert_eq!(s.slot_minutes, 15);
    }

    #[test]
    fn missing_optional_fields_deserialize_to_defaults() {
        let json = r#"{"work_start":"09:00","work_end":"17:00","slot_minutes":30,"weekdays_mask":62}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert!(s.notification_silent);
        assert!(s.group_notifications);
        assert!(!s.auto_focus_on_slot);
        assert_eq!(s.stale_threshold_minutes, 0);
    }
}
