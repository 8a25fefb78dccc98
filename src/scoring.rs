//! Guess scoring.
//!
//! A guess is compared against the actual track field by field with
//! case-insensitive substring containment in both directions, and the highest
//! applicable tier wins: both fields > title only > artist only > miss.
//! Blank fields never match, so an untouched guess form scores zero.

use serde::{Deserialize, Serialize};

use crate::api::Song;

/// Points for matching both title and artist.
pub const SCORE_BOTH: u32 = 100;

/// Points for matching the title only.
pub const SCORE_TITLE_ONLY: u32 = 60;

/// Points for matching the artist only.
pub const SCORE_ARTIST_ONLY: u32 = 40;

/// Points deducted for skipping a round (clamped so the total never goes
/// negative).
pub const SKIP_PENALTY: u32 = 10;

/// The player's answer for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Guess {
    /// Guessed track title.
    pub song_guess: String,
    /// Guessed artist name.
    pub artist_guess: String,
}

impl Guess {
    /// Create a guess from title and artist answers.
    pub fn new(song_guess: impl Into<String>, artist_guess: impl Into<String>) -> Self {
        Self {
            song_guess: song_guess.into(),
            artist_guess: artist_guess.into(),
        }
    }
}

/// Which score bucket a completed round fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTier {
    /// Both title and artist matched.
    Both,
    /// Only the title matched.
    TitleOnly,
    /// Only the artist matched.
    ArtistOnly,
    /// Nothing matched (includes letting the timer run out).
    Miss,
    /// The round was skipped without a guess.
    Skipped,
}

impl ScoreTier {
    /// Points awarded for this tier. Skips score zero here; the penalty is
    /// applied by the round controller against the running total.
    pub fn points(self) -> u32 {
        match self {
            Self::Both => SCORE_BOTH,
            Self::TitleOnly => SCORE_TITLE_ONLY,
            Self::ArtistOnly => SCORE_ARTIST_ONLY,
            Self::Miss | Self::Skipped => 0,
        }
    }
}

/// Score a guess against the actual track.
pub fn score_guess(guess: &Guess, actual: &Song) -> (ScoreTier, u32) {
    let title_match = fields_match(&guess.song_guess, &actual.title);
    let artist_match = fields_match(&guess.artist_guess, &actual.artist);

    let tier = match (title_match, artist_match) {
        (true, true) => ScoreTier::Both,
        (true, false) => ScoreTier::TitleOnly,
        (false, true) => ScoreTier::ArtistOnly,
        (false, false) => ScoreTier::Miss,
    };
    (tier, tier.points())
}

/// Case-insensitive containment in either direction. A blank guess never
/// matches (`"".contains` would otherwise accept everything).
fn fields_match(guess: &str, actual: &str) -> bool {
    let guess = guess.trim().to_lowercase();
    if guess.is_empty() {
        return false;
    }
    let actual = actual.trim().to_lowercase();
    if actual.is_empty() {
        return false;
    }
    guess.contains(&actual) || actual.contains(&guess)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn bohemian_rhapsody() -> Song {
        Song {
            id: "1".into(),
            title: "Bohemian Rhapsody".into(),
            artist: "Queen".into(),
            album: "A Night at the Opera".into(),
            duration_seconds: 354.0,
            audio_preview_url: "queen.mp3".into(),
        }
    }

    #[test]
    fn exact_case_insensitive_match_scores_top_tier() {
        let guess = Guess::new("bohemian rhapsody", "queen");
        let (tier, points) = score_guess(&guess, &bohemian_rhapsody());
        assert_eq!(tier, ScoreTier::Both);
        assert_eq!(points, SCORE_BOTH);
    }

    #[test]
    fn partial_title_with_wrong_artist_scores_title_tier() {
        let guess = Guess::new("rhapsody", "the beatles");
        let (tier, points) = score_guess(&guess, &bohemian_rhapsody());
        assert_eq!(tier, ScoreTier::TitleOnly);
        assert_eq!(points, SCORE_TITLE_ONLY);
    }

    #[test]
    fn artist_only_match_scores_artist_tier() {
        let guess = Guess::new("stairway to heaven", "QUEEN");
        let (tier, points) = score_guess(&guess, &bohemian_rhapsody());
        assert_eq!(tier, ScoreTier::ArtistOnly);
        assert_eq!(points, SCORE_ARTIST_ONLY);
    }

    #[test]
    fn containment_works_in_both_directions() {
        // Guess contains actual.
        let guess = Guess::new("it's bohemian rhapsody by queen", "");
        assert_eq!(
            score_guess(&guess, &bohemian_rhapsody()).0,
            ScoreTier::TitleOnly
        );
        // Actual contains guess.
        let guess = Guess::new("bohemian", "");
        assert_eq!(
            score_guess(&guess, &bohemian_rhapsody()).0,
            ScoreTier::TitleOnly
        );
    }

    #[test]
    fn blank_guesses_never_match() {
        let guess = Guess::default();
        let (tier, points) = score_guess(&guess, &bohemian_rhapsody());
        assert_eq!(tier, ScoreTier::Miss);
        assert_eq!(points, 0);

        let whitespace = Guess::new("   ", "\t");
        assert_eq!(score_guess(&whitespace, &bohemian_rhapsody()).0, ScoreTier::Miss);
    }

    #[test]
    fn tier_ordering_is_monotonic() {
        assert!(ScoreTier::Both.points() > ScoreTier::TitleOnly.points());
        assert!(ScoreTier::TitleOnly.points() > ScoreTier::ArtistOnly.points());
        assert!(ScoreTier::ArtistOnly.points() > ScoreTier::Miss.points());
        assert_eq!(ScoreTier::Skipped.points(), 0);
    }
}
