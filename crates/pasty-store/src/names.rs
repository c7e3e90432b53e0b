//! Friendly device names (`BRAVE-OCTOPUS`) handed out by `/id`.
//!
//! Nouns may contain a hyphen (`X-RAY`); adjectives never do, so the first
//! `-` always separates the two words.

use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "able", "brave", "calm", "clean", "clear", "cold", "dark", "deep", "dry", "easy", "elated",
    "fair", "fast", "fine", "free", "friendly", "good", "hard", "harsh", "heavy", "honest", "hot",
    "huge", "innocent", "jolly", "keen", "kind", "lazy", "light", "little", "loyal", "mean",
    "modern", "neat", "nice", "open", "optimistic", "petty", "quick", "rare", "real", "reliable",
    "rough", "safe", "sharp", "shy", "silly", "simple", "slim", "smart", "soft", "strong", "sweet",
    "tender", "thin", "tight", "timid", "tough", "unique", "vain", "vague", "valid", "warm",
    "weak", "wet", "wild", "wise", "young", "zany", "zealous", "altruistic", "artsy", "bright",
    "broad", "bold", "bitter", "bouncy", "careful", "cheerful", "chilly", "chunky", "clumsy",
    "courageous", "crafty", "cute", "curious", "dense", "delicate", "difficult", "eager",
    "easygoing", "energetic", "elegant", "fiery", "flat", "fresh", "genuine", "graceful", "grim",
    "gritty", "happy", "harmless", "ideal", "intense", "inventive", "jumpy", "lively", "loving",
    "loud", "low", "messy", "mild", "mischievous", "needy", "new", "noble", "nostalgic",
    "precious", "racy", "reasonable", "righteous", "robust", "serene", "shiny", "sleek", "stiff",
    "sturdy", "swift", "tasty", "trustworthy",
];

const NOUNS: &[&str] = &[
    "apple", "banana", "car", "dog", "elephant", "fish", "guitar", "house", "island", "jacket",
    "kangaroo", "lamp", "moon", "notebook", "orange", "pencil", "quilt", "river", "sun", "tree",
    "umbrella", "violin", "window", "xylophone", "yacht", "zebra", "airplane", "bicycle", "cat",
    "dolphin", "ear", "flame", "grape", "honey", "insect", "jungle", "key", "lemon", "mountain",
    "nail", "ocean", "planet", "queen", "rocket", "star", "telescope", "unicorn", "vampire",
    "whale", "x-ray", "yellow", "zoo", "lime", "butterfly", "cliff", "daisy", "eagle", "firefly",
    "giraffe", "hammock", "ice", "jewel", "kettle", "lava", "mango", "needle", "oasis", "parrot",
    "quail", "rock", "snow", "turtle", "vulture", "waterfall", "xenon", "yarn", "zinnia", "acorn",
    "bottle", "candle", "diamond", "eggplant", "feather", "gravel", "halo", "inbox", "necklace",
    "keychain", "leash", "mushroom", "net", "octopus", "piano", "quiver", "ring", "stone", "tea",
    "underwear", "vase", "wood", "pumpkin", "yogurt", "zenith", "albatross", "bee", "clover",
    "duck", "rat", "fern", "goose", "hummingbird", "ivory", "jaguar", "koala", "lily", "maple",
    "nut", "olive", "pear", "quince", "rooster", "seahorse", "toucan", "violet", "wombat", "mouse",
    "yak", "rose",
];

/// Generate a name with the thread-local RNG.
pub fn generate_name() -> String {
    generate_name_with(&mut rand::rng())
}

/// Generate a name from `rng`: uppercase adjective, `-`, uppercase noun.
pub fn generate_name_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];
    format!("{}-{}", adjective.to_uppercase(), noun.to_uppercase())
}
