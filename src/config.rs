use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::GuardError;
use crate::model::{ChatId, UserId};
use crate::platform::ChatRef;
use crate::security::SecurityConfig;

/// 守卫引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    pub bot: BotConfig,
    /// 必须加入的群组（按配置顺序，第一个对应 joined_group_1）
    pub required_groups: Vec<RequiredGroupConfig>,
    pub security: SecurityConfig,
    pub access: AccessConfig,
    /// 数据库连接 URL（为空时使用内存存储）
    pub database_url: Option<String>,
    pub log_level: String,
    pub log_format: Option<String>,
    pub log_file: Option<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            bot: BotConfig::default(),
            required_groups: Vec::new(),
            security: SecurityConfig::default(),
            access: AccessConfig::default(),
            database_url: None,
            log_level: "info".to_string(),
            log_format: None,
            log_file: None,
        }
    }
}

/// 机器人配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// 特权操作员（群主）ID
    pub owner_ids: Vec<UserId>,
    /// 平台调用超时（秒）
    pub request_timeout_secs: u64,
    /// 安全闸门清理间隔（秒）
    pub cleanup_interval_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            owner_ids: Vec::new(),
            request_timeout_secs: 10,
            cleanup_interval_secs: 300,
        }
    }
}

impl BotConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

/// 额度与付费等级配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub free_daily_limit: i32,
    pub vip_daily_limit: i32,
    pub vvip_daily_limit: i32,
    pub vip_default_days: i64,
    pub vvip_default_days: i64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            free_daily_limit: 10,
            vip_daily_limit: 50,
            vvip_daily_limit: 100,
            vip_default_days: 30,
            vvip_default_days: 30,
        }
    }
}

/// 必须加入的群组（配置原始形式）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredGroupConfig {
    pub name: String,
    pub chat_id: Option<ChatId>,
    pub username: Option<String>,
    /// 邀请链接
    pub link: Option<String>,
}

/// 校验后的必须群组：至少有 chat_id 或 username 之一
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredGroup {
    pub name: String,
    pub chat_id: Option<ChatId>,
    pub username: Option<String>,
    pub link: Option<String>,
}

impl RequiredGroup {
    pub fn try_from_config(entry: &RequiredGroupConfig) -> Result<Self, GuardError> {
        let username = entry
            .username
            .as_deref()
            .map(|u| u.trim().trim_start_matches('@'))
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        if entry.chat_id.is_none() && username.is_none() {
            return Err(GuardError::Configuration(format!(
                "required group '{}' has neither chat_id nor username",
                entry.name
            )));
        }

        Ok(Self {
            name: entry.name.clone(),
            chat_id: entry.chat_id,
            username,
            link: entry.link.clone().filter(|l| !l.is_empty()),
        })
    }

    /// 成员查询顺序：先 chat_id，再 username
    pub fn lookup_refs(&self) -> Vec<ChatRef> {
        let mut refs = Vec::with_capacity(2);
        if let Some(id) = self.chat_id {
            refs.push(ChatRef::Id(id));
        }
        if let Some(name) = &self.username {
            refs.push(ChatRef::Username(name.clone()));
        }
        refs
    }

    /// 按 chat_id 或用户名（大小写不敏感）匹配会话
    pub fn matches_chat(&self, chat_id: ChatId, chat_username: Option<&str>) -> bool {
        if self.chat_id == Some(chat_id) {
            return true;
        }
        match (&self.username, chat_username) {
            (Some(expected), Some(actual)) => {
                expected.eq_ignore_ascii_case(actual.trim_start_matches('@'))
            }
            _ => false,
        }
    }
}

/// 必须群组列表（格式错误的条目已被跳过）
#[derive(Debug, Clone, Default)]
pub struct RequiredGroups {
    groups: Arc<Vec<RequiredGroup>>,
}

impl RequiredGroups {
    pub fn new(groups: Vec<RequiredGroup>) -> Self {
        Self {
            groups: Arc::new(groups),
        }
    }

    /// 校验配置，格式错误的条目记录日志后跳过
    pub fn from_config(entries: &[RequiredGroupConfig]) -> Self {
        let groups = entries
            .iter()
            .filter_map(|entry| match RequiredGroup::try_from_config(entry) {
                Ok(group) => Some(group),
                Err(e) => {
                    warn!("⚠️ 跳过必须群组配置: {}", e);
                    None
                }
            })
            .collect();
        Self::new(groups)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequiredGroup> {
        self.groups.iter()
    }

    pub fn get(&self, index: usize) -> Option<&RequiredGroup> {
        self.groups.get(index)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn find_matching(&self, chat_id: ChatId, chat_username: Option<&str>) -> Option<&RequiredGroup> {
        self.groups
            .iter()
            .find(|g| g.matches_chat(chat_id, chat_username))
    }
}

/// 特权操作员集合
#[derive(Debug, Clone, Default)]
pub struct Operators {
    ids: Arc<HashSet<UserId>>,
}

impl Operators {
    pub fn new(ids: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            ids: Arc::new(ids.into_iter().collect()),
        }
    }

    pub fn is_privileged(&self, user_id: UserId) -> bool {
        self.ids.contains(&user_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl GuardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required_groups(&self) -> RequiredGroups {
        RequiredGroups::from_config(&self.required_groups)
    }

    pub fn operators(&self) -> Operators {
        Operators::new(self.bot.owner_ids.iter().copied())
    }

    /// 列出所有格式错误的必须群组条目
    pub fn validate(&self) -> Vec<GuardError> {
        self.required_groups
            .iter()
            .filter_map(|entry| RequiredGroup::try_from_config(entry).err())
            .collect()
    }

    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(content).with_context(|| "配置文件格式错误")?;
        Ok(toml_config.into())
    }

    /// 从环境变量加载配置（CHATGUARD_ 前缀）
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(ids) = env::var("CHATGUARD_OWNER_IDS") {
            self.bot.owner_ids = parse_id_list(&ids)
                .with_context(|| format!("CHATGUARD_OWNER_IDS 格式错误: {}", ids))?;
        }
        if let Ok(timeout) = env::var("CHATGUARD_REQUEST_TIMEOUT") {
            self.bot.request_timeout_secs =
                timeout.parse().unwrap_or(self.bot.request_timeout_secs);
        }
        if let Ok(db_url) = env::var("DATABASE_URL") {
            self.database_url = Some(db_url);
        }
        if let Ok(log_level) = env::var("CHATGUARD_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(log_format) = env::var("CHATGUARD_LOG_FORMAT") {
            self.log_format = Some(log_format);
        }
        if let Ok(log_file) = env::var("CHATGUARD_LOG_FILE") {
            self.log_file = Some(log_file);
        }
        Ok(())
    }

    /// 从命令行参数合并配置
    pub fn merge_from_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(db_url) = &cli.database_url {
            self.database_url = Some(db_url.clone());
        }
        if !cli.owner_ids.is_empty() {
            self.bot.owner_ids = cli.owner_ids.clone();
        }
        if let Some(log_level) = cli.get_log_level() {
            self.log_level = log_level;
        }
        if let Some(log_format) = cli.get_log_format() {
            self.log_format = Some(log_format);
        }
        if let Some(log_file) = &cli.log_file {
            self.log_file = Some(log_file.clone());
        }
    }

    /// 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    pub fn load(cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if let Some(config_file) = &cli.config_file {
            if Path::new(config_file).exists() {
                info!("📄 从配置文件加载: {}", config_file);
                Self::from_toml_file(config_file)?
            } else {
                warn!("⚠️ 配置文件不存在: {}", config_file);
                Self::new()
            }
        } else if Path::new("config.toml").exists() {
            info!("📄 从默认配置文件加载: config.toml");
            Self::from_toml_file("config.toml")?
        } else {
            Self::new()
        };

        config.merge_from_env()?;
        config.merge_from_cli(cli);

        Ok(config)
    }
}

fn parse_id_list(raw: &str) -> Result<Vec<UserId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<UserId>()
                .with_context(|| format!("无效的用户 ID: {}", s))
        })
        .collect()
}

/// 日志配置（启动早期读取，此时完整配置尚未加载）
#[derive(Debug, Default)]
pub struct EarlyLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<String>,
}

/// 只读取配置文件的 [logging] 段，失败时返回空配置
pub fn load_early_logging_config(config_file: Option<&str>) -> EarlyLoggingConfig {
    let path = config_file.unwrap_or("config.toml");
    let Ok(content) = fs::read_to_string(path) else {
        return EarlyLoggingConfig::default();
    };

    #[derive(Deserialize)]
    struct LoggingOnly {
        logging: Option<TomlLoggingConfig>,
    }

    match toml::from_str::<LoggingOnly>(&content) {
        Ok(LoggingOnly {
            logging: Some(logging),
        }) => EarlyLoggingConfig {
            level: logging.level,
            format: logging.format,
            file: logging.file,
        },
        _ => EarlyLoggingConfig::default(),
    }
}

/// TOML 配置文件结构（用于反序列化）
#[derive(Debug, Deserialize)]
struct TomlConfig {
    bot: Option<BotConfig>,
    #[serde(default)]
    required_groups: Vec<RequiredGroupConfig>,
    security: Option<SecurityConfig>,
    access: Option<AccessConfig>,
    database: Option<TomlDatabaseConfig>,
    logging: Option<TomlLoggingConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlDatabaseConfig {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlLoggingConfig {
    level: Option<String>,
    format: Option<String>,
    file: Option<String>,
}

impl From<TomlConfig> for GuardConfig {
    fn from(toml: TomlConfig) -> Self {
        let mut config = Self::default();

        if let Some(bot) = toml.bot {
            config.bot = bot;
        }
        config.required_groups = toml.required_groups;
        if let Some(security) = toml.security {
            config.security = security;
        }
        if let Some(access) = toml.access {
            config.access = access;
        }
        if let Some(database) = toml.database {
            config.database_url = database.url.filter(|u| !u.is_empty());
        }
        if let Some(logging) = toml.logging {
            if let Some(level) = logging.level {
                config.log_level = level;
            }
            config.log_format = logging.format;
            config.log_file = logging.file;
        }

        config
    }
}
