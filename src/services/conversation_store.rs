//! 会话存储 - 业务能力层
//!
//! 只负责"保存 / 读取会话"，不关心状态机。
//!
//! - `FileConversationStore` - 每个会话一个 JSON 文件
//! - `MemoryConversationStore` - 进程内存储，用于测试和不需要持久化的场景

use crate::error::{AppError, AppResult, StoreError};
use crate::models::{
    ConversationId, ConversationPayload, ConversationRecord, ConversationSummary, Document,
    OutlineStore, QaExchange,
};
use crate::utils::preview_line;
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 会话列表预览的最大字符数
pub const PREVIEW_CHARS: usize = 60;

/// 会话存储
///
/// 职责：
/// - 目录生成成功时创建会话
/// - 追加已生成的章节和问答
/// - 按 ID 加载、列出、删除会话
pub trait ConversationStore: Send + Sync + 'static {
    /// 创建会话，返回新分配的 ID
    fn create_conversation(
        &self,
        document: &Document,
        outline: &OutlineStore,
    ) -> impl Future<Output = AppResult<ConversationId>> + Send;

    /// 加载会话并校验
    fn load_conversation(
        &self,
        id: ConversationId,
    ) -> impl Future<Output = AppResult<ConversationPayload>> + Send;

    /// 保存章节，已存在的章节保持不变
    fn save_chapter(
        &self,
        id: ConversationId,
        chapter: u32,
        text: &str,
    ) -> impl Future<Output = AppResult<()>> + Send;

    /// 追加一条已完成的问答
    fn save_exchange(
        &self,
        id: ConversationId,
        exchange: &QaExchange,
    ) -> impl Future<Output = AppResult<()>> + Send;

    /// 列出所有会话，最新的在前
    fn list_conversations(&self) -> impl Future<Output = AppResult<Vec<ConversationSummary>>> + Send;

    fn delete_conversation(&self, id: ConversationId) -> impl Future<Output = AppResult<()>> + Send;
}

fn new_record(id: ConversationId, document: &Document, outline: &OutlineStore) -> ConversationRecord {
    ConversationRecord {
        id,
        created_at: Utc::now(),
        document: document.clone(),
        outline: outline.entries().to_vec(),
        chapters: BTreeMap::new(),
        qa_history: Vec::new(),
    }
}

fn summarize(record: &ConversationRecord) -> ConversationSummary {
    ConversationSummary {
        id: record.id,
        created_at: record.created_at,
        preview: preview_line(&record.document.text, PREVIEW_CHARS),
    }
}

fn sort_newest_first(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

// ========== 文件存储 ==========

/// 已分配过的最大 ID 所在的文件
const ID_COUNTER_FILE: &str = "last_id";

/// 文件会话存储
///
/// 文件名为 `conversation-{id}.json`，写入时先写临时文件再重命名。
/// 分配过的 ID 记录在 `last_id` 中，删除会话后也不会被再次分配。
pub struct FileConversationStore {
    dir: PathBuf,
    /// 串行化读改写
    lock: Mutex<()>,
}

impl FileConversationStore {
    /// 打开存储目录，不存在时创建
    pub async fn open(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::store_write_failed(dir.display().to_string(), e))?;
        info!("📁 会话存储目录: {}", dir.display());
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn path_of(&self, id: ConversationId) -> PathBuf {
        self.dir.join(format!("conversation-{}.json", id.0))
    }

    fn id_from_path(path: &Path) -> Option<u64> {
        path.file_name()?
            .to_str()?
            .strip_prefix("conversation-")?
            .strip_suffix(".json")?
            .parse()
            .ok()
    }

    async fn read_record(&self, id: ConversationId) -> AppResult<ConversationRecord> {
        let path = self.path_of(id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { id: id.0 }.into())
            }
            Err(e) => return Err(AppError::store_read_failed(path.display().to_string(), e)),
        };

        let record: ConversationRecord =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupted {
                path: path.display().to_string(),
                source,
            })?;
        if record.id != id {
            return Err(AppError::invalid_conversation(
                id.0,
                format!("文件中的 ID 为 {}", record.id),
            ));
        }
        Ok(record)
    }

    async fn write_record(&self, record: &ConversationRecord) -> AppResult<()> {
        let path = self.path_of(record.id);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| AppError::Other(format!("会话序列化失败: {}", e)))?;

        fs::write(&tmp_path, content)
            .await
            .map_err(|e| AppError::store_write_failed(tmp_path.display().to_string(), e))?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| AppError::store_write_failed(path.display().to_string(), e))?;
        debug!("会话已写入: {}", path.display());
        Ok(())
    }

    /// 分配下一个 ID：取计数文件和现存文件中的最大值加一
    async fn allocate_id(&self) -> AppResult<ConversationId> {
        let counter_path = self.dir.join(ID_COUNTER_FILE);
        let recorded = match fs::read_to_string(&counter_path).await {
            Ok(content) => content.trim().parse::<u64>().unwrap_or_else(|_| {
                warn!("⚠️ ID 计数文件内容无效，按现有会话重新计算: {}", content.trim());
                0
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                return Err(AppError::store_read_failed(
                    counter_path.display().to_string(),
                    e,
                ))
            }
        };
        let existing = self.scan_ids().await?.last().copied().unwrap_or(0);
        let next = recorded.max(existing) + 1;

        let tmp_path = counter_path.with_extension("tmp");
        fs::write(&tmp_path, next.to_string())
            .await
            .map_err(|e| AppError::store_write_failed(tmp_path.display().to_string(), e))?;
        fs::rename(&tmp_path, &counter_path)
            .await
            .map_err(|e| AppError::store_write_failed(counter_path.display().to_string(), e))?;
        Ok(ConversationId(next))
    }

    /// 目录中所有会话文件的 ID
    async fn scan_ids(&self) -> AppResult<Vec<u64>> {
        let dir_name = self.dir.display().to_string();
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| AppError::store_read_failed(dir_name.clone(), e))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::store_read_failed(dir_name.clone(), e))?
        {
            if let Some(id) = Self::id_from_path(&entry.path()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

impl ConversationStore for FileConversationStore {
    async fn create_conversation(
        &self,
        document: &Document,
        outline: &OutlineStore,
    ) -> AppResult<ConversationId> {
        let _guard = self.lock.lock().await;
        let id = self.allocate_id().await?;
        self.write_record(&new_record(id, document, outline)).await?;
        info!("💾 创建会话 {} ({} 章)", id, outline.len());
        Ok(id)
    }

    async fn load_conversation(&self, id: ConversationId) -> AppResult<ConversationPayload> {
        let record = {
            let _guard = self.lock.lock().await;
            self.read_record(id).await?
        };
        ConversationPayload::from_record(record)
    }

    async fn save_chapter(&self, id: ConversationId, chapter: u32, text: &str) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut record = self.read_record(id).await?;
        if record.chapters.contains_key(&chapter) {
            debug!("会话 {} 第 {} 章已保存过，跳过", id, chapter);
            return Ok(());
        }
        record.chapters.insert(chapter, text.to_string());
        self.write_record(&record).await
    }

    async fn save_exchange(&self, id: ConversationId, exchange: &QaExchange) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut record = self.read_record(id).await?;
        record.qa_history.push(exchange.clone());
        self.write_record(&record).await
    }

    async fn list_conversations(&self) -> AppResult<Vec<ConversationSummary>> {
        let _guard = self.lock.lock().await;
        let mut summaries = Vec::new();
        for id in self.scan_ids().await? {
            match self.read_record(ConversationId(id)).await {
                Ok(record) => summaries.push(summarize(&record)),
                Err(e) => warn!("⚠️ 跳过无法读取的会话 #{}: {}", id, e),
            }
        }
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }

    async fn delete_conversation(&self, id: ConversationId) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let path = self.path_of(id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("🗑️ 删除会话 {}", id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound { id: id.0 }.into())
            }
            Err(source) => Err(StoreError::DeleteFailed {
                path: path.display().to_string(),
                source,
            }
            .into()),
        }
    }
}

// ========== 内存存储 ==========

#[derive(Default)]
struct MemoryInner {
    next_id: u64,
    records: BTreeMap<ConversationId, ConversationRecord>,
}

/// 内存会话存储
#[derive(Default)]
pub struct MemoryConversationStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入一条记录（用于预置数据）
    pub async fn insert_record(&self, record: ConversationRecord) {
        let mut inner = self.inner.lock().await;
        inner.next_id = inner.next_id.max(record.id.0);
        inner.records.insert(record.id, record);
    }

    /// 读取原始记录
    pub async fn record(&self, id: ConversationId) -> Option<ConversationRecord> {
        self.inner.lock().await.records.get(&id).cloned()
    }
}

impl ConversationStore for MemoryConversationStore {
    async fn create_conversation(
        &self,
        document: &Document,
        outline: &OutlineStore,
    ) -> AppResult<ConversationId> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = ConversationId(inner.next_id);
        inner.records.insert(id, new_record(id, document, outline));
        Ok(id)
    }

    async fn load_conversation(&self, id: ConversationId) -> AppResult<ConversationPayload> {
        let record = self
            .record(id)
            .await
            .ok_or(StoreError::NotFound { id: id.0 })?;
        ConversationPayload::from_record(record)
    }

    async fn save_chapter(&self, id: ConversationId, chapter: u32, text: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id: id.0 })?;
        record
            .chapters
            .entry(chapter)
            .or_insert_with(|| text.to_string());
        Ok(())
    }

    async fn save_exchange(&self, id: ConversationId, exchange: &QaExchange) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id: id.0 })?;
        record.qa_history.push(exchange.clone());
        Ok(())
    }

    async fn list_conversations(&self) -> AppResult<Vec<ConversationSummary>> {
        let inner = self.inner.lock().await;
        let mut summaries: Vec<_> = inner.records.values().map(summarize).collect();
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }

    async fn delete_conversation(&self, id: ConversationId) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .records
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound { id: id.0 }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutlineEntry;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    fn outline() -> OutlineStore {
        OutlineStore::from_entries(vec![
            OutlineEntry::new(1, "引言"),
            OutlineEntry::new(2, "方法"),
            OutlineEntry::new(3, "结论"),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileConversationStore::open(dir.path()).await.unwrap();
        let document = Document::new("第一行\n\n第二行", "研究生");

        let id = store.create_conversation(&document, &outline()).await.unwrap();
        assert_eq!(id, ConversationId(1));

        assert_ok!(store.save_chapter(id, 1, "第一章").await);
        assert_ok!(store.save_chapter(id, 1, "重复写入").await);
        assert_ok!(store.save_exchange(id, &QaExchange::new("问", "答")).await);

        let payload = assert_ok!(store.load_conversation(id).await);
        assert_eq!(payload.document, document);
        assert_eq!(payload.outline.len(), 3);
        assert_eq!(payload.chapters.get(1), Some("第一章"));
        assert_eq!(payload.qa_history.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_list_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileConversationStore::open(dir.path()).await.unwrap();

        let first = store
            .create_conversation(&Document::new("旧文档", "背景"), &outline())
            .await
            .unwrap();
        let second = store
            .create_conversation(&Document::new("新文档\n内容", "背景"), &outline())
            .await
            .unwrap();
        assert_eq!(second, ConversationId(2));

        let list = store.list_conversations().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second);
        assert_eq!(list[0].preview, "新文档 内容");

        assert_ok!(store.delete_conversation(first).await);
        assert_err!(store.load_conversation(first).await);
        assert_err!(store.delete_conversation(first).await);
        assert_eq!(store.list_conversations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_never_reuses_deleted_id() {
        let dir = TempDir::new().unwrap();
        let store = FileConversationStore::open(dir.path()).await.unwrap();
        let document = Document::new("文档", "背景");

        let first = store.create_conversation(&document, &outline()).await.unwrap();
        assert_ok!(store.delete_conversation(first).await);
        let second = store.create_conversation(&document, &outline()).await.unwrap();
        assert_eq!(first, ConversationId(1));
        assert_eq!(second, ConversationId(2));

        // 重新打开目录后计数仍然保留
        assert_ok!(store.delete_conversation(second).await);
        let reopened = FileConversationStore::open(dir.path()).await.unwrap();
        let third = reopened.create_conversation(&document, &outline()).await.unwrap();
        assert_eq!(third, ConversationId(3));
        assert_err!(reopened.load_conversation(second).await);
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupted_file() {
        let dir = TempDir::new().unwrap();
        let store = FileConversationStore::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("conversation-5.json"), "{ not json").unwrap();

        let err = store.load_conversation(ConversationId(5)).await.unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::Corrupted { .. })));
        assert!(store.list_conversations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_missing_conversation() {
        let store = MemoryConversationStore::new();
        let err = store.load_conversation(ConversationId(3)).await.unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::NotFound { id: 3 })));
    }

    #[tokio::test]
    async fn test_memory_store_never_reuses_deleted_id() {
        let store = MemoryConversationStore::new();
        let document = Document::new("文档", "背景");
        let first = store.create_conversation(&document, &outline()).await.unwrap();
        assert_ok!(store.delete_conversation(first).await);

        let second = store.create_conversation(&document, &outline()).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_memory_store_keeps_first_chapter_text() {
        let store = MemoryConversationStore::new();
        let id = store
            .create_conversation(&Document::new("文档", "背景"), &outline())
            .await
            .unwrap();
        store.save_chapter(id, 2, "第一次").await.unwrap();
        store.save_chapter(id, 2, "第二次").await.unwrap();

        let record = store.record(id).await.unwrap();
        assert_eq!(record.chapters.get(&2).map(String::as_str), Some("第一次"));
    }
}
