//! Heuristic password strength scoring

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StrengthLevel {
    Weak,
    Medium,
    Strong,
    Excellent,
}

impl StrengthLevel {
    pub fn advice(self) -> &'static str {
        match self {
            StrengthLevel::Weak => "Weak - Add more characters and variety",
            StrengthLevel::Medium => "Medium - Good but could be stronger",
            StrengthLevel::Strong => "Strong - Excellent password strength",
            StrengthLevel::Excellent => "Excellent - Maximum security",
        }
    }
}

impl fmt::Display for StrengthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.advice())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strength {
    /// 0..=100
    pub score: u8,
    pub level: StrengthLevel,
}

const DIGIT_RUNS: [&str; 9] = [
    "012", "123", "234", "345", "456", "567", "678", "789", "890",
];

/// Score a password on length and character variety.
pub fn estimate(password: &str) -> Strength {
    let chars: Vec<char> = password.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Strength {
            score: 0,
            level: StrengthLevel::Weak,
        };
    }

    let mut score: u32 = 0;

    if len >= 8 {
        score += 20;
    }
    if len >= 12 {
        score += 15;
    }
    if len >= 16 {
        score += 15;
    }

    if chars.iter().any(char::is_ascii_lowercase) {
        score += 10;
    }
    if chars.iter().any(char::is_ascii_uppercase) {
        score += 10;
    }
    if chars.iter().any(char::is_ascii_digit) {
        score += 10;
    }
    if chars.iter().any(|c| !c.is_ascii_alphanumeric()) {
        score += 10;
    }

    let has_triple = chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2]);
    if !has_triple {
        score += 5;
    }
    let has_run = DIGIT_RUNS.iter().any(|run| password.contains(run));
    if !has_run {
        score += 5;
    }
    if len > 20 {
        score += 5;
    }

    let level = match score {
        0..=29 => StrengthLevel::Weak,
        30..=59 => StrengthLevel::Medium,
        60..=84 => StrengthLevel::Strong,
        _ => StrengthLevel::Excellent,
    };

    Strength {
        score: score.min(100) as u8,
        level,
    }
}
