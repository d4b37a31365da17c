// src/constants.rs

// --- Time Constants ---
pub const DAY_SECONDS: i64 = 86400;

// --- Weak-Area Analysis ---
pub const WEAK_THRESHOLD: f64 = 60.0; // Percent
pub const RECENT_HALF_WEIGHT: f64 = 1.5;
pub const OLDER_HALF_WEIGHT: f64 = 1.0;
pub const CONSISTENCY_URGENCY_CAP: f64 = 20.0;
pub const CONSISTENCY_VARIANCE_DIVISOR: f64 = 10.0;
pub const IMPROVEMENT_THRESHOLD: f64 = 10.0; // Mastery points between halves
pub const IMPROVING_MULTIPLIER: f64 = 0.7;
pub const DECLINING_MULTIPLIER: f64 = 1.3;

// --- Recent Performance ---
pub const RECENT_WINDOW_DAYS: i64 = 7;
pub const RECENT_EXAM_COUNT: usize = 5;
pub const EXAM_LIKE_MIN_QUESTIONS: u32 = 20;
pub const TREND_THRESHOLD: f64 = 5.0;
pub const NEW_USER_TIER: u8 = 3;
pub const TIER_MIN: u8 = 1;
pub const TIER_MAX: u8 = 10;

// Average score floor -> base tier, highest first
pub const TIER_THRESHOLDS: [(f64, u8); 5] = [(90.0, 9), (80.0, 7), (70.0, 5), (60.0, 4), (50.0, 3)];
pub const FLOOR_TIER: u8 = 2; // Below every threshold

// --- Exposure ---
pub const MIN_DAYS_SINCE_SEEN: i64 = 7;
pub const MAX_TIMES_SHOWN: u32 = 3;

// --- Exam Structure ---
pub const NON_VISUAL_TARGET: usize = 30;
pub const VISUAL_TARGET: usize = 20;
pub const FOCUS_TOPIC_COUNT: usize = 5;

// Share of the exam drawn from weak topics, by number of weak topics
pub const WEAK_SHARE_SINGLE: f64 = 0.7;
pub const WEAK_SHARE_FEW: f64 = 0.6; // 2-3 weak topics
pub const WEAK_SHARE_MANY: f64 = 0.5; // 4+ weak topics

// --- Difficulty Bands (easy, medium, hard) ---
pub const BAND_LOW: (f64, f64, f64) = (0.6, 0.4, 0.0); // Tier <= 3
pub const BAND_MID: (f64, f64, f64) = (0.3, 0.5, 0.2); // Tier 4-6
pub const BAND_HIGH: (f64, f64, f64) = (0.2, 0.4, 0.4); // Tier 7-8
pub const BAND_TOP: (f64, f64, f64) = (0.1, 0.3, 0.6); // Tier >= 9

// --- Recommendation ---
pub const MAX_SKIPS: u32 = 3;
pub const COMFORT_THRESHOLD: f64 = 88.0;
pub const CRITICAL_SCORE: f64 = 40.0; // Below: "critical gap" justification
pub const SEVERE_SCORE: f64 = 50.0; // Below: "focused practice" justification

// --- Personalization Score ---
pub const PERSONALIZATION_WEAK_WEIGHT: f64 = 70.0;
pub const PERSONALIZATION_DIFFICULTY_WEIGHT: f64 = 30.0;
