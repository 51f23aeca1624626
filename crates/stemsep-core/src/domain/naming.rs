//! Naming - 入力/出力アーティファクトのキー規約
//!
//! 投入側・ワーカー・取得側の三者は共有 DB を持たず、このモジュールの
//! 関数だけでキーを合意します。キー書式はここ以外で組み立てないこと。
//!
//! - 入力: `{id}.mp3`（input bucket）
//! - 出力: `{id}-{part}.mp3`（output bucket）

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ids::JobId;

/// 入出力アーティファクトの拡張子
pub const AUDIO_EXT: &str = "mp3";

/// One part of the transform's fixed output set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Vocals,
    Bass,
    Drums,
    Other,
}

impl Stem {
    /// Transform が必ず生成する出力の集合（publish 順）
    pub const ALL: [Stem; 4] = [Stem::Vocals, Stem::Bass, Stem::Drums, Stem::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Bass => "bass",
            Stem::Drums => "drums",
            Stem::Other => "other",
        }
    }

    /// Transform の出力ディレクトリ内でのファイル名
    pub fn file_name(self) -> String {
        format!("{}.{AUDIO_EXT}", self.as_str())
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown part {0:?} (expected one of: vocals, bass, drums, other)")]
pub struct UnknownStem(pub String);

impl FromStr for Stem {
    type Err = UnknownStem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stem::ALL
            .into_iter()
            .find(|stem| stem.as_str() == s)
            .ok_or_else(|| UnknownStem(s.to_string()))
    }
}

/// Key of the input artifact for `id`.
pub fn input_key(id: &JobId) -> String {
    format!("{id}.{AUDIO_EXT}")
}

/// Key of one output artifact for `id`.
pub fn output_key(id: &JobId, stem: Stem) -> String {
    format!("{id}-{stem}.{AUDIO_EXT}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn id(s: &str) -> JobId {
        JobId::parse(s).unwrap()
    }

    #[test]
    fn input_key_is_flat() {
        assert_eq!(input_key(&id("abc123")), "abc123.mp3");
    }

    #[rstest]
    #[case(Stem::Vocals, "abc123-vocals.mp3")]
    #[case(Stem::Bass, "abc123-bass.mp3")]
    #[case(Stem::Drums, "abc123-drums.mp3")]
    #[case(Stem::Other, "abc123-other.mp3")]
    fn output_keys(#[case] stem: Stem, #[case] expected: &str) {
        assert_eq!(output_key(&id("abc123"), stem), expected);
    }

    #[test]
    fn output_keys_never_collide_with_input_key() {
        let id = id("abc123");
        for stem in Stem::ALL {
            assert_ne!(output_key(&id, stem), input_key(&id));
        }
    }

    #[test]
    fn stem_parse() {
        assert_eq!("drums".parse::<Stem>().unwrap(), Stem::Drums);
        assert_eq!(
            "guitar".parse::<Stem>().unwrap_err(),
            UnknownStem("guitar".into())
        );
        assert_eq!(Stem::Other.file_name(), "other.mp3");
    }
}
