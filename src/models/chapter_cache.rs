//! 章节缓存
//!
//! 章节编号 → 已生成内容。会话内只追加：同一章写入一次后，
//! 后续写入被忽略，空内容永远不会写入。

use std::collections::BTreeMap;

/// 章节缓存
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterCache {
    chapters: BTreeMap<u32, String>,
}

impl ChapterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入章节内容
    ///
    /// 返回是否真正写入（已存在或内容为空时返回 `false`）
    pub fn insert(&mut self, chapter: u32, text: String) -> bool {
        if text.trim().is_empty() || self.chapters.contains_key(&chapter) {
            return false;
        }
        self.chapters.insert(chapter, text);
        true
    }

    pub fn contains(&self, chapter: u32) -> bool {
        self.chapters.contains_key(&chapter)
    }

    pub fn get(&self, chapter: u32) -> Option<&str> {
        self.chapters.get(&chapter).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// 编号最小的已缓存章节
    pub fn first_chapter(&self) -> Option<u32> {
        self.chapters.keys().next().copied()
    }

    /// 按编号升序遍历
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.chapters
            .iter()
            .map(|(chapter, text)| (*chapter, text.as_str()))
    }

    /// 编号小于 `chapter` 的所有章节
    pub fn before(&self, chapter: u32) -> impl Iterator<Item = (u32, &str)> {
        self.chapters
            .range(..chapter)
            .map(|(chapter, text)| (*chapter, text.as_str()))
    }
}

impl FromIterator<(u32, String)> for ChapterCache {
    fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
        let mut cache = Self::new();
        for (chapter, text) in iter {
            cache.insert(chapter, text);
        }
        cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_write_once() {
        let mut cache = ChapterCache::new();
        assert!(cache.insert(1, "第一版".to_string()));
        assert!(!cache.insert(1, "第二版".to_string()));
        assert_eq!(cache.get(1), Some("第一版"));
    }

    #[test]
    fn test_insert_ignores_blank_text() {
        let mut cache = ChapterCache::new();
        assert!(!cache.insert(2, "  \n".to_string()));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_before_excludes_target_and_later() {
        let cache: ChapterCache = [(1, "a"), (2, "b"), (4, "d")]
            .into_iter()
            .map(|(n, t)| (n, t.to_string()))
            .collect();

        let prior: Vec<u32> = cache.before(4).map(|(n, _)| n).collect();
        assert_eq!(prior, vec![1, 2]);
        assert_eq!(cache.first_chapter(), Some(1));
    }
}
