use crate::Result;
use crate::evaluator::Word;
use anyhow::Context;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// 词库文件格式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WordListData {
    pub categories: BTreeMap<String, Vec<String>>,
}

/// 谜底词库
#[derive(Debug, Clone)]
pub struct WordList {
    categories: BTreeMap<String, Vec<Word>>,
    all_words: Vec<Word>,
    /// 加载时被拒绝的词及原因
    rejected: Vec<(String, String)>,
    file_path: Option<String>,
}

const DEFAULT_WORDS: &[&str] = &[
    "CRANE", "FACTS", "SLATE", "TRACE", "ALLOY", "LLAMA", "ERASE", "SPEED", "FLOOR", "ROBOT",
    "GHOST", "PLANT", "BRICK", "CHESS", "MONEY", "NIGHT", "OCEAN", "PIANO", "QUEEN", "RIVER",
];

impl WordList {
    /// 从配置的文件加载，失败时使用内置词库
    pub fn new(config: &crate::config::WordListConfig) -> Self {
        let mut word_list = WordList::with_defaults();
        word_list.file_path = Some(config.file_path.clone());

        if let Err(e) = word_list.load_from_file(&config.file_path) {
            warn!("无法加载词库文件: {}, 使用默认词库", e);
        }

        word_list
    }

    pub fn with_defaults() -> Self {
        let mut word_list = WordList::empty();
        word_list.load_default_words();
        word_list
    }

    pub fn from_data(data: WordListData) -> Self {
        let mut word_list = WordList::empty();
        word_list.apply(data);
        word_list
    }

    fn empty() -> Self {
        WordList {
            categories: BTreeMap::new(),
            all_words: Vec::new(),
            rejected: Vec::new(),
            file_path: None,
        }
    }

    /// 打开要编辑的词库文件：文件不存在时从内置词库开始，文件损坏时返回错误
    pub fn open(path: &str) -> Result<Self> {
        let mut word_list = if std::path::Path::new(path).exists() {
            let mut word_list = WordList::empty();
            word_list.load_from_file(path)?;
            word_list
        } else {
            warn!("词库文件 {} 不存在，从默认词库开始", path);
            WordList::with_defaults()
        };
        word_list.file_path = Some(path.to_string());
        Ok(word_list)
    }

    /// 从文件加载词库，失败时保留原有内容
    pub fn load_from_file(&mut self, path: &str) -> Result<()> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("无法读取词库文件: {}", path))?;

        let data: WordListData =
            serde_json::from_str(&content).with_context(|| "无法解析词库文件格式")?;

        let loaded = WordList::from_data(data);
        if loaded.all_words.is_empty() {
            return Err(crate::Error::WordList(format!("词库文件 {} 中没有可用的单词", path)));
        }

        self.categories = loaded.categories;
        self.all_words = loaded.all_words;
        self.rejected = loaded.rejected;
        debug!("从 {} 加载了 {} 个单词", path, self.all_words.len());
        Ok(())
    }

    /// 保存词库到文件
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let content =
            serde_json::to_string_pretty(&self.to_data()).with_context(|| "无法序列化词库")?;

        std::fs::write(path, content).with_context(|| format!("无法写入词库文件: {}", path))?;

        Ok(())
    }

    fn apply(&mut self, data: WordListData) {
        self.categories.clear();
        self.rejected.clear();

        for (category, words) in data.categories {
            let mut parsed = Vec::with_capacity(words.len());
            for raw in words {
                match Word::parse(&raw) {
                    Ok(word) => parsed.push(word),
                    Err(e) => self.rejected.push((raw, e.to_string())),
                }
            }
            self.categories.insert(category, parsed);
        }

        self.update_all_words();
    }

    pub fn to_data(&self) -> WordListData {
        WordListData {
            categories: self
                .categories
                .iter()
                .map(|(name, words)| (name.clone(), words.iter().map(|w| w.to_string()).collect()))
                .collect(),
        }
    }

    /// 加载默认词库
    fn load_default_words(&mut self) {
        let mut data = WordListData::default();
        data.categories.insert(
            "common".to_string(),
            DEFAULT_WORDS.iter().map(|w| w.to_string()).collect(),
        );
        self.apply(data);
    }

    /// 更新所有词语列表，跨分类去重
    fn update_all_words(&mut self) {
        let mut seen = HashSet::new();
        self.all_words = self
            .categories
            .values()
            .flatten()
            .filter(|word| seen.insert(**word))
            .copied()
            .collect();
    }

    /// 随机选取谜底
    pub fn random_secret(&self) -> Option<Word> {
        let mut rng = rand::rng();
        self.all_words.choose(&mut rng).copied()
    }

    /// 从指定分类随机选取谜底
    pub fn random_secret_from(&self, category: &str) -> Option<Word> {
        let mut rng = rand::rng();
        self.categories
            .get(category)
            .and_then(|words| words.choose(&mut rng).copied())
    }

    pub fn contains(&self, word: &Word) -> bool {
        self.all_words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.all_words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_words.is_empty()
    }

    /// 获取所有分类
    pub fn categories(&self) -> Vec<&String> {
        self.categories.keys().collect()
    }

    pub fn category_words(&self, category: &str) -> Option<&[Word]> {
        self.categories.get(category).map(|words| words.as_slice())
    }

    /// 添加单词到指定分类，返回是否新增
    pub fn add_word(&mut self, category: &str, text: &str) -> Result<bool> {
        let word = Word::parse(text).map_err(|e| crate::Error::WordList(e.to_string()))?;
        let words = self.categories.entry(category.to_string()).or_default();
        if words.contains(&word) {
            return Ok(false);
        }
        words.push(word);
        self.update_all_words();
        Ok(true)
    }

    /// 从所有分类中删除单词，返回删除的数量
    pub fn remove_word(&mut self, text: &str) -> Result<usize> {
        let word = Word::parse(text).map_err(|e| crate::Error::WordList(e.to_string()))?;
        let mut removed = 0;
        for words in self.categories.values_mut() {
            let before = words.len();
            words.retain(|w| *w != word);
            removed += before - words.len();
        }
        self.update_all_words();
        Ok(removed)
    }

    /// 获取词库统计信息
    pub fn stats(&self) -> WordListStats {
        WordListStats {
            total_words: self.all_words.len(),
            total_categories: self.categories.len(),
            category_stats: self
                .categories
                .iter()
                .map(|(name, words)| (name.clone(), words.len()))
                .collect(),
            rejected: self.rejected.len(),
        }
    }

    /// 验证词库完整性
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (raw, reason) in &self.rejected {
            errors.push(format!("单词 '{}' 无效: {}", raw, reason));
        }

        for (category, words) in &self.categories {
            if words.is_empty() {
                errors.push(format!("分类 '{}' 没有单词", category));
            }

            let mut seen = HashSet::new();
            for word in words {
                if !seen.insert(word) {
                    errors.push(format!("分类 '{}' 中单词 {} 重复", category, word));
                }
            }
        }

        errors
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct WordListStats {
    pub total_words: usize,
    pub total_categories: usize,
    pub category_stats: BTreeMap<String, usize>,
    pub rejected: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_include_known_secrets() {
        let list = WordList::with_defaults();
        assert!(list.contains(&Word::parse("facts").unwrap()));
        assert!(list.contains(&Word::parse("crane").unwrap()));
        assert!(list.validate().is_empty());
        assert!(list.random_secret().is_some());
        assert!(list.random_secret_from("common").is_some());
        assert!(list.random_secret_from("missing").is_none());
    }

    #[test]
    fn load_reports_invalid_words() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"categories": {{"easy": ["crane", "toolong", "sl4te"], "empty": []}}}}"#
        )
        .unwrap();

        let mut list = WordList::with_defaults();
        list.load_from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(list.stats().rejected, 2);
        assert_eq!(list.validate().len(), 3);
        assert!(!list.contains(&Word::parse("facts").unwrap()));
    }

    #[test]
    fn load_fails_without_usable_words() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"categories": {{"easy": ["xx"]}}}}"#).unwrap();

        let mut list = WordList::with_defaults();
        let before = list.len();
        assert!(list.load_from_file(file.path().to_str().unwrap()).is_err());
        assert!(list.load_from_file("/nonexistent/words.json").is_err());
        // 加载失败不影响已有词库
        assert_eq!(list.len(), before);
        assert!(list.contains(&Word::parse("facts").unwrap()));
    }

    #[test]
    fn open_refuses_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"mine": ["FJORD", "NYMPH"],}}"#).unwrap();
        let path = file.path().to_str().unwrap();

        assert!(WordList::open(path).is_err());
        // 文件内容保持不变
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("FJORD"));
    }

    #[test]
    fn open_edits_existing_or_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.json");
        let path = path.to_str().unwrap();

        let mut list = WordList::open(path).unwrap();
        assert_eq!(list.file_path(), Some(path));
        assert!(list.contains(&Word::parse("crane").unwrap()));
        list.add_word("hard", "fjord").unwrap();
        list.save_to_file(path).unwrap();

        let reopened = WordList::open(path).unwrap();
        assert!(reopened.contains(&Word::parse("fjord").unwrap()));
        assert_eq!(reopened.len(), list.len());
    }

    #[test]
    fn add_remove_and_save() {
        let mut list = WordList::with_defaults();
        assert!(list.add_word("hard", "fjord").unwrap());
        assert!(!list.add_word("hard", "FJORD").unwrap());
        assert!(list.add_word("hard", "fj0rd").is_err());
        assert_eq!(list.category_words("hard").unwrap().len(), 1);

        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        list.save_to_file(path).unwrap();

        let mut reloaded = WordList::with_defaults();
        reloaded.load_from_file(path).unwrap();
        assert_eq!(reloaded.len(), list.len());
        assert_eq!(reloaded.remove_word("fjord").unwrap(), 1);
        assert!(!reloaded.contains(&Word::parse("fjord").unwrap()));
    }
}
