use serde::{Deserialize, Serialize};

/// Canonical weekday token. Wire form is the lowercase 3-letter name;
/// parsing accepts English and Russian names and abbreviations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Day {
    pub fn as_str(self) -> &'static str {
        match self {
            Day::Mon => "mon",
            Day::Tue => "tue",
            Day::Wed => "wed",
            Day::Thu => "thu",
            Day::Fri => "fri",
            Day::Sat => "sat",
            Day::Sun => "sun",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim().to_lowercase();
        match token.as_str() {
            "mon" | "monday" | "пн" | "понедельник" => Some(Day::Mon),
            "tue" | "tues" | "tuesday" | "вт" | "вторник" => Some(Day::Tue),
            "wed" | "wednesday" | "ср" | "среда" => Some(Day::Wed),
            "thu" | "thur" | "thurs" | "thursday" | "чт" | "четверг" => Some(Day::Thu),
            "fri" | "friday" | "пт" | "пятница" => Some(Day::Fri),
            "sat" | "saturday" | "сб" | "суббота" => Some(Day::Sat),
            "sun" | "sunday" | "вс" | "воскресенье" => Some(Day::Sun),
            _ => None,
        }
    }
}

impl std::fmt::Display for Day {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a csv or whitespace-separated day list, dropping unknown tokens
/// and duplicates. Output iterates in canonical mon..sun order.
pub fn parse_day_list(raw: &str) -> std::collections::BTreeSet<Day> {
    raw.split(|ch: char| ch == ',' || ch == ';' || ch.is_whitespace())
        .filter(|token| !token.is_empty())
        .filter_map(Day::parse)
        .collect()
}
