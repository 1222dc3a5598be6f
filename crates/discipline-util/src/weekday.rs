//! Weekdays and weekday sets

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    /// 0 = Monday .. 6 = Sunday
    pub fn from_number_from_monday(number: u8) -> Option<Weekday> {
        Self::ALL.get(number as usize).copied()
    }

    pub fn number_from_monday(self) -> u8 {
        self as u8
    }

    /// Accepts short and long English names, case-insensitively
    pub fn from_name(name: &str) -> Option<Weekday> {
        match name.to_lowercase().as_str() {
            "mon" | "monday" => Some(Weekday::Mon),
            "tue" | "tuesday" => Some(Weekday::Tue),
            "wed" | "wednesday" => Some(Weekday::Wed),
            "thu" | "thursday" => Some(Weekday::Thu),
            "fri" | "friday" => Some(Weekday::Fri),
            "sat" | "saturday" => Some(Weekday::Sat),
            "sun" | "sunday" => Some(Weekday::Sun),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        1 << self.number_from_monday()
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(weekday: chrono::Weekday) -> Self {
        match weekday {
            chrono::Weekday::Mon => Weekday::Mon,
            chrono::Weekday::Tue => Weekday::Tue,
            chrono::Weekday::Wed => Weekday::Wed,
            chrono::Weekday::Thu => Weekday::Thu,
            chrono::Weekday::Fri => Weekday::Fri,
            chrono::Weekday::Sat => Weekday::Sat,
            chrono::Weekday::Sun => Weekday::Sun,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
            Weekday::Sun => "Sun",
        };
        f.write_str(name)
    }
}

/// Set of weekdays stored as a bitmask. Bit 0 is Monday; bit 7 is never set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: WeekdaySet = WeekdaySet(0);
    pub const ALL: WeekdaySet = WeekdaySet(0x7F);
    pub const WEEKDAYS: WeekdaySet = WeekdaySet(0x1F);
    pub const WEEKENDS: WeekdaySet = WeekdaySet(0x60);

    pub fn from_bitmask(bitmask: u8) -> Self {
        Self(bitmask & 0x7F)
    }

    pub fn bitmask(self) -> u8 {
        self.0
    }

    pub fn single(weekday: Weekday) -> Self {
        Self(weekday.bit())
    }

    pub fn add(&mut self, weekday: Weekday) {
        self.0 |= weekday.bit();
    }

    pub fn remove(&mut self, weekday: Weekday) {
        self.0 &= !weekday.bit();
    }

    pub fn toggle(&mut self, weekday: Weekday) {
        self.0 ^= weekday.bit();
    }

    pub fn contains(self, weekday: Weekday) -> bool {
        self.0 & weekday.bit() != 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn set_all(&mut self) {
        self.0 = Self::ALL.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        Weekday::ALL.into_iter().filter(move |day| self.contains(*day))
    }
}

impl From<u8> for WeekdaySet {
    fn from(bitmask: u8) -> Self {
        Self::from_bitmask(bitmask)
    }
}

impl From<WeekdaySet> for u8 {
    fn from(set: WeekdaySet) -> Self {
        set.0
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::EMPTY;
        for day in iter {
            set.add(day);
        }
        set
    }
}

impl std::ops::BitOr for WeekdaySet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeekdaySet({:0>7b})", self.0)
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|day| day.to_string()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
