/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use crate::config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化全局日志
///
/// 默认级别为 `chapter_tutor=info`（详细模式下为 debug），
/// 设置了 `RUST_LOG` 时以环境变量为准。重复调用不会报错。
pub fn init(verbose: bool) {
    let default_directive = if verbose {
        "chapter_tutor=debug"
    } else {
        "chapter_tutor=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!(
        "🚀 程序启动 - {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("🤖 模型: {} ({})", config.llm_model_name, config.llm_api_base_url);
    info!("📁 会话目录: {}", config.store_dir);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示和上下文拼装
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

/// 把文本压成单行预览
///
/// 先按字符数截断，再把每段连续空白折叠为一个空格。
pub fn preview_line(text: &str, max_len: usize) -> String {
    let truncated = truncate_text(text, max_len);
    let mut preview = String::with_capacity(truncated.len());
    let mut in_space = false;
    for c in truncated.chars() {
        if c.is_whitespace() {
            if !in_space {
                preview.push(' ');
            }
            in_space = true;
        } else {
            preview.push(c);
            in_space = false;
        }
    }
    preview
}
