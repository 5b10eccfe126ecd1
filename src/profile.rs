//! Per-user rows hung off [`crate::user::User`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Accent color of the interface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Primary,
    Blue,
    Green,
    Red,
    Indigo,
    Aqua,
    Orange,
    Claret,
}

impl Theme {
    pub const ALL: [Theme; 8] = [
        Theme::Primary,
        Theme::Blue,
        Theme::Green,
        Theme::Red,
        Theme::Indigo,
        Theme::Aqua,
        Theme::Orange,
        Theme::Claret,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Primary => "primary",
            Theme::Blue => "blue",
            Theme::Green => "green",
            Theme::Red => "red",
            Theme::Indigo => "indigo",
            Theme::Aqua => "aqua",
            Theme::Orange => "orange",
            Theme::Claret => "claret",
        }
    }
}

/// Page background.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    #[default]
    Light,
    Dark,
}

impl Background {
    pub const ALL: [Background; 2] = [Background::Light, Background::Dark];

    pub fn as_str(&self) -> &'static str {
        match self {
            Background::Light => "light",
            Background::Dark => "dark",
        }
    }
}

/// Unknown choice stored in database.
#[derive(Debug, thiserror::Error)]
#[error("unknown choice `{0}`")]
pub struct UnknownChoice(String);

impl FromStr for Theme {
    type Err = UnknownChoice;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Theme::ALL
            .into_iter()
            .find(|theme| theme.as_str() == value)
            .ok_or_else(|| UnknownChoice(value.to_owned()))
    }
}

impl FromStr for Background {
    type Err = UnknownChoice;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Background::ALL
            .into_iter()
            .find(|bg| bg.as_str() == value)
            .ok_or_else(|| UnknownChoice(value.to_owned()))
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Theme preference, one row per user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeChanger {
    #[serde(skip)]
    pub user_id: i64,
    pub theme: Theme,
    pub background_theme: Background,
}

impl ThemeChanger {
    /// Default preference: primary on light.
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            theme: Theme::default(),
            background_theme: Background::default(),
        }
    }
}

/// Uploaded avatar, one row per user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAvatar {
    pub user_id: i64,
    /// Public URL of the image.
    pub url: String,
    /// Storage key, used on deletion.
    pub key: String,
}

/// Email change waiting for confirmation, one row per user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditEmail {
    pub user_id: i64,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choices() {
        for theme in Theme::ALL {
            assert_eq!(theme.as_str().parse::<Theme>().unwrap(), theme);
        }
        assert_eq!("dark".parse::<Background>().unwrap(), Background::Dark);
        assert!("purple".parse::<Theme>().is_err());
        assert!("Dark".parse::<Background>().is_err());
    }

    #[test]
    fn test_default_preference() {
        let theme = ThemeChanger::new(7);

        assert_eq!(theme.theme, Theme::Primary);
        assert_eq!(theme.background_theme, Background::Light);
    }

    #[test]
    fn test_serde_matches_as_str() {
        assert_eq!(
            serde_json::to_string(&Theme::Claret).unwrap(),
            "\"claret\""
        );
        assert_eq!(
            serde_json::from_str::<Background>("\"light\"").unwrap(),
            Background::Light
        );
    }
}
