//! Tier - 2 段階の優先度
//!
//! micro はホストの次のターンより前、macro は通常のターンで drain される。

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tier はキューの優先度段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// ホストの次のターンより前に drain される（容量制限あり）
    Micro,
    /// 通常のターンで drain される（容量無制限）
    Macro,
}

impl Tier {
    /// long-stack モードで因果スタックの区切りに使うラベル
    pub fn stack_separator(self) -> &'static str {
        match self {
            Tier::Micro => "\nEnqueued in micro queue by:\n",
            Tier::Macro => "\nEnqueued in macro queue by:\n",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Micro => "micro",
            Tier::Macro => "macro",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_differ_per_tier() {
        assert_ne!(Tier::Micro.stack_separator(), Tier::Macro.stack_separator());
        assert!(Tier::Micro.stack_separator().contains("micro queue"));
        assert!(Tier::Macro.stack_separator().starts_with('\n'));
    }

    #[test]
    fn display_matches_serde_name() {
        let json = serde_json::to_string(&Tier::Micro).unwrap();
        assert_eq!(json, format!("\"{}\"", Tier::Micro));
    }
}
