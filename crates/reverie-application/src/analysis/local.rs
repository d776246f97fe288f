//! Deterministic local analysis heuristics.
//!
//! These run entirely on-device and are the fallback for every remote
//! failure, so they must stay reproducible: fixed lexicons, fixed
//! thresholds, deterministic tie-breaking.

use chrono::{Datelike, NaiveDate, Weekday};
use reverie_core::Entry;
use reverie_core::analysis::{
    EmojiUsage, EntrySentiment, MoodTrendPoint, Pattern, PatternSummary, Sentiment,
    SentimentSummary, TrendSummary,
};
use std::collections::{BTreeMap, HashMap};

/// Lexicon matched case-insensitively as substrings of entry content.
const POSITIVE_WORDS: &[&str] = &[
    "happy",
    "joy",
    "grateful",
    "love",
    "excited",
    "great",
    "good",
    "wonderful",
    "amazing",
    "calm",
    "proud",
    "hopeful",
    "peaceful",
    "accomplished",
    "relaxed",
];

const NEGATIVE_WORDS: &[&str] = &[
    "sad",
    "angry",
    "anxious",
    "stressed",
    "tired",
    "worried",
    "frustrated",
    "lonely",
    "afraid",
    "depressed",
    "upset",
    "hurt",
    "annoyed",
    "overwhelmed",
    "exhausted",
];

/// Tokens excluded from pattern detection regardless of frequency.
const STOP_WORDS: &[&str] = &[
    "this", "that", "with", "have", "will", "from", "they", "them", "then", "than", "been",
    "were", "their", "would", "there", "about", "which", "could", "should", "because", "really",
    "just", "like", "when", "what", "your", "some", "into", "very", "much", "today",
];

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

fn entry_text(entry: &Entry) -> &str {
    // Ciphertext bodies contribute no text to local heuristics.
    entry.body.as_plaintext().unwrap_or("")
}

/// Classifies a single entry by lexicon hit counts.
///
/// Score is `±min(count / 10, 1)` for the dominant polarity, `0` for
/// ties (including the no-match case).
fn classify_entry(entry: &Entry) -> EntrySentiment {
    let lower = entry_text(entry).to_lowercase();
    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();

    let (sentiment, score) = if positive > negative {
        (Sentiment::Positive, (positive as f64 / 10.0).min(1.0))
    } else if negative > positive {
        (Sentiment::Negative, -(negative as f64 / 10.0).min(1.0))
    } else {
        (Sentiment::Neutral, 0.0)
    };

    EntrySentiment {
        entry_id: entry.id.clone(),
        sentiment,
        score,
    }
}

/// Lexicon-based sentiment over the entry set.
///
/// The overall score is the mean of per-entry scores, classified
/// positive above `0.1`, negative below `-0.1`, neutral otherwise.
pub fn local_sentiment(entries: &[Entry]) -> SentimentSummary {
    let per_entry: Vec<EntrySentiment> = entries.iter().map(classify_entry).collect();
    let score = if per_entry.is_empty() {
        0.0
    } else {
        per_entry.iter().map(|e| e.score).sum::<f64>() / per_entry.len() as f64
    };
    let overall = if score > 0.1 {
        Sentiment::Positive
    } else if score < -0.1 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    };

    SentimentSummary {
        overall,
        score,
        per_entry,
    }
}

/// Recurring-token detection across the entry set.
///
/// Tokens are lower-cased whitespace splits stripped of non-word
/// characters; tokens of length <= 3 and stop words are discarded.
/// Tokens with frequency >= 2 are kept, sorted descending by frequency
/// (then ascending by name for determinism); the top 10 become
/// patterns and the top 5 names the flat list.
pub fn local_patterns(entries: &[Entry]) -> PatternSummary {
    struct TokenStats {
        frequency: usize,
        entry_ids: Vec<String>,
    }

    let mut tokens: HashMap<String, TokenStats> = HashMap::new();
    for entry in entries {
        for raw in entry_text(entry).to_lowercase().split_whitespace() {
            let token: String = raw.chars().filter(|c| c.is_alphanumeric()).collect();
            if token.len() <= 3 || STOP_WORDS.contains(&token.as_str()) {
                continue;
            }
            let stats = tokens.entry(token).or_insert_with(|| TokenStats {
                frequency: 0,
                entry_ids: Vec::new(),
            });
            stats.frequency += 1;
            if !stats.entry_ids.contains(&entry.id) {
                stats.entry_ids.push(entry.id.clone());
            }
        }
    }

    let mut patterns: Vec<Pattern> = tokens
        .into_iter()
        .filter(|(_, stats)| stats.frequency >= 2)
        .map(|(name, stats)| Pattern {
            name,
            frequency: stats.frequency,
            entry_ids: stats.entry_ids,
        })
        .collect();
    patterns.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| a.name.cmp(&b.name))
    });
    patterns.truncate(10);

    let top_patterns = patterns.iter().take(5).map(|p| p.name.clone()).collect();
    PatternSummary {
        patterns,
        top_patterns,
    }
}

/// Writing-habit statistics over the entry set.
///
/// `today` is passed in so the backward streak walk is testable.
pub fn local_trends(entries: &[Entry], today: NaiveDate) -> TrendSummary {
    if entries.is_empty() {
        return TrendSummary {
            mood_trends: Vec::new(),
            day_of_week_counts: WEEKDAY_NAMES.iter().map(|d| (d.to_string(), 0)).collect(),
            most_active_day: String::new(),
            current_streak: 0,
            average_entries_per_week: 0.0,
            emoji_usage: Vec::new(),
        };
    }

    // Per-day dominant mood, chronological. BTreeMap keeps dates sorted.
    let mut moods_by_day: BTreeMap<NaiveDate, HashMap<&str, usize>> = BTreeMap::new();
    for entry in entries {
        let mood = entry.mood.as_deref().unwrap_or("neutral");
        *moods_by_day
            .entry(entry.timestamp.date_naive())
            .or_default()
            .entry(mood)
            .or_default() += 1;
    }
    let mood_trends: Vec<MoodTrendPoint> = moods_by_day
        .iter()
        .map(|(date, counts)| {
            let mut labels: Vec<(&str, usize)> =
                counts.iter().map(|(m, c)| (*m, *c)).collect();
            // Highest count wins; ties break lexicographically.
            labels.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            MoodTrendPoint {
                date: *date,
                mood: labels[0].0.to_string(),
            }
        })
        .collect();

    // Day-of-week histogram, Monday first.
    let mut weekday_counts = [0usize; 7];
    for entry in entries {
        weekday_counts[entry.timestamp.weekday().num_days_from_monday() as usize] += 1;
    }
    let most_active_index = (0..7)
        .max_by_key(|&i| (weekday_counts[i], std::cmp::Reverse(i)))
        .unwrap_or(0);
    let day_of_week_counts: Vec<(String, usize)> = WEEKDAY_NAMES
        .iter()
        .zip(weekday_counts)
        .map(|(name, count)| (name.to_string(), count))
        .collect();

    // Current streak: consecutive calendar days walking backward from
    // today, stopping at the first gap of more than one day.
    let mut dates: Vec<NaiveDate> = moods_by_day.keys().copied().collect();
    dates.reverse();
    let mut streak = 0u32;
    let mut previous = today;
    for date in dates {
        if (previous - date).num_days() <= 1 {
            streak += 1;
            previous = date;
        } else {
            break;
        }
    }

    let earliest = *moods_by_day.keys().next().expect("entries is non-empty");
    let latest = *moods_by_day.keys().next_back().expect("entries is non-empty");
    let span_days = (latest - earliest).num_days().max(0);
    let weeks = ((span_days + 6) / 7).max(1);
    let average_entries_per_week = entries.len() as f64 / weeks as f64;

    // Emoji usage frequency, relative to total entry count.
    let mut emoji_counts: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        for emoji in &entry.emojis {
            *emoji_counts.entry(emoji.as_str()).or_default() += 1;
        }
    }
    let mut emoji_usage: Vec<EmojiUsage> = emoji_counts
        .into_iter()
        .map(|(emoji, count)| EmojiUsage {
            emoji: emoji.to_string(),
            count,
            relative_frequency: count as f64 / entries.len() as f64,
        })
        .collect();
    emoji_usage.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.emoji.cmp(&b.emoji)));

    TrendSummary {
        mood_trends,
        day_of_week_counts,
        most_active_day: WEEKDAY_NAMES[most_active_index].to_string(),
        current_streak: streak,
        average_entries_per_week,
        emoji_usage,
    }
}
