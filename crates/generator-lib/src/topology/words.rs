//! Word lists for readable generated tag names

pub(crate) const ADJECTIVES: &[&str] = &[
    "amber", "ancient", "autumn", "bold", "brave", "brisk", "calm", "clever", "cold", "crimson",
    "curly", "damp", "dark", "dawn", "divine", "dry", "eager", "empty", "fancy", "fierce",
    "floral", "fragrant", "frosty", "gentle", "gilded", "glad", "golden", "green", "hidden",
    "hollow", "icy", "jolly", "late", "lively", "lucky", "misty", "muddy", "nameless", "noisy",
    "old", "patient", "plain", "polished", "proud", "purple", "quiet", "rapid", "restless",
    "rough", "round", "shy", "silent", "silver", "small", "snowy", "solitary", "sparkling",
    "spring", "steep", "still", "summer", "swift", "tight", "tiny", "twilight", "wandering",
    "weathered", "white", "wild", "winter", "wispy", "withered", "young",
];

pub(crate) const NOUNS: &[&str] = &[
    "bird", "breeze", "brook", "bush", "butterfly", "cherry", "cloud", "darkness", "dawn", "dew",
    "dream", "dust", "feather", "field", "fire", "firefly", "flower", "fog", "forest", "frog",
    "frost", "glade", "glitter", "grass", "haze", "hill", "lake", "leaf", "meadow", "moon",
    "morning", "mountain", "night", "paper", "pine", "pond", "rain", "resonance", "river", "sea",
    "shadow", "shape", "silence", "sky", "smoke", "snow", "snowflake", "sound", "star", "sun",
    "sunset", "surf", "thunder", "tree", "violet", "voice", "water", "waterfall", "wave",
    "wildflower", "wind", "wood",
];

pub(crate) const ADVERBS: &[&str] = &[
    "boldly", "briskly", "calmly", "carefully", "cheerfully", "eagerly", "gently", "gladly",
    "happily", "lazily", "loudly", "neatly", "openly", "patiently", "quickly", "quietly",
    "rapidly", "rarely", "sharply", "silently", "slowly", "softly", "swiftly", "warmly",
];

pub(crate) const VERBS: &[&str] = &[
    "bakes", "blinks", "builds", "climbs", "dances", "drifts", "falls", "flies", "flows", "glows",
    "grows", "hums", "jumps", "leaps", "listens", "paints", "rests", "rises", "roams", "runs",
    "sings", "sleeps", "spins", "swims", "travels", "waits", "walks", "wanders", "whistles",
];
