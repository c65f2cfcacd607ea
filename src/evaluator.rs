//! 猜词判定
//!
//! 两遍扫描处理重复字母：先标记位置完全匹配的字母并从谜底中消耗掉，
//! 再用剩余谜底字母的计数从左到右判定"存在"或"不存在"。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 单词长度
pub const WORD_LENGTH: usize = 5;

/// 判定错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("单词长度必须为 {expected} 个字母，实际为 {actual}")]
    InvalidInputLength { expected: usize, actual: usize },
    #[error("单词包含非法字符: {0:?}")]
    InvalidCharacter(char),
}

/// 五个大写字母组成的单词
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Word([u8; WORD_LENGTH]);

impl Word {
    /// 解析并规范化为大写；先校验长度，再校验字符
    pub fn parse(text: &str) -> Result<Self, EvaluationError> {
        let text = text.trim();
        let actual = text.chars().count();
        if actual != WORD_LENGTH {
            return Err(EvaluationError::InvalidInputLength {
                expected: WORD_LENGTH,
                actual,
            });
        }

        let mut letters = [0u8; WORD_LENGTH];
        for (slot, ch) in letters.iter_mut().zip(text.chars()) {
            if !ch.is_ascii_alphabetic() {
                return Err(EvaluationError::InvalidCharacter(ch));
            }
            *slot = ch.to_ascii_uppercase() as u8;
        }

        Ok(Word(letters))
    }

    pub fn letters(&self) -> &[u8; WORD_LENGTH] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // 构造时保证全部为ASCII大写字母
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// 某个字母在单词中出现的次数
    pub fn count_of(&self, letter: u8) -> usize {
        let letter = letter.to_ascii_uppercase();
        self.0.iter().filter(|&&b| b == letter).count()
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Word {
    type Err = EvaluationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Word::parse(s)
    }
}

impl Serialize for Word {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Word {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Word::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// 单个字母的判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LetterVerdict {
    Correct,
    Present,
    Absent,
}

impl LetterVerdict {
    /// 设备端协议使用的编码：0 = 不存在，1 = 位置错误，2 = 位置正确
    pub fn code(self) -> u8 {
        match self {
            LetterVerdict::Absent => 0,
            LetterVerdict::Present => 1,
            LetterVerdict::Correct => 2,
        }
    }

    pub fn emoji(self) -> char {
        match self {
            LetterVerdict::Correct => '🟩',
            LetterVerdict::Present => '🟨',
            LetterVerdict::Absent => '⬜',
        }
    }
}

/// 一次猜测的完整判定，与猜测单词逐位对齐
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationResult([LetterVerdict; WORD_LENGTH]);

impl EvaluationResult {
    pub fn verdicts(&self) -> &[LetterVerdict; WORD_LENGTH] {
        &self.0
    }

    /// 是否全部猜中
    pub fn is_solved(&self) -> bool {
        self.0.iter().all(|v| *v == LetterVerdict::Correct)
    }

    pub fn codes(&self) -> [u8; WORD_LENGTH] {
        self.0.map(LetterVerdict::code)
    }

    pub fn to_emoji(&self) -> String {
        self.0.iter().map(|v| v.emoji()).collect()
    }
}

/// 判定两个已校验的单词
pub fn evaluate_words(guess: &Word, secret: &Word) -> EvaluationResult {
    let mut verdicts = [LetterVerdict::Absent; WORD_LENGTH];
    let mut resolved = [false; WORD_LENGTH];
    let mut remaining: HashMap<u8, usize> = HashMap::new();

    // 第一遍：位置完全匹配
    for (i, (g, s)) in guess.0.iter().zip(secret.0.iter()).enumerate() {
        if g == s {
            verdicts[i] = LetterVerdict::Correct;
            resolved[i] = true;
        } else {
            *remaining.entry(*s).or_insert(0) += 1;
        }
    }

    // 第二遍：按剩余计数从左到右判定
    for (i, letter) in guess.0.iter().enumerate() {
        if resolved[i] {
            continue;
        }
        match remaining.get_mut(letter) {
            Some(count) if *count > 0 => {
                verdicts[i] = LetterVerdict::Present;
                *count -= 1;
            }
            _ => verdicts[i] = LetterVerdict::Absent,
        }
    }

    EvaluationResult(verdicts)
}

/// 判定原始字符串，大小写不敏感
pub fn evaluate(guess: &str, secret: &str) -> Result<EvaluationResult, EvaluationError> {
    let guess = Word::parse(guess)?;
    let secret = Word::parse(secret)?;
    Ok(evaluate_words(&guess, &secret))
}
