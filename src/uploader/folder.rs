//! 章节文件夹扫描
//!
//! 批量上传时根目录下的每个子文件夹是一章：
//! - 章节号取文件夹名中的第一个数字（`Cap 012` -> `12`，`ch10.5` -> `10.5`）
//! - 文件夹内的图片按自然顺序排序（`2.jpg` 在 `10.jpg` 之前）
//! - 没有数字的文件夹和非图片文件会被跳过
//! - 超大文件和超量章节不会被裁剪，由 `ScannedChapter::validate` 报告

use crate::uploader::{
    format_file_size, mime_from_path, ChapterBatch, ChapterFiles, ChapterMetadata,
    FileValidation, ALLOWED_IMAGE_TYPES,
};
use anyhow::{Context, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 扫描到的图片
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub local_path: PathBuf,
    pub size: u64,
}

/// 扫描到的章节
#[derive(Debug, Clone)]
pub struct ScannedChapter {
    /// 文件夹名
    pub folder_name: String,
    pub path: PathBuf,
    /// 章节号
    pub number: String,
    /// 按自然顺序排列的图片
    pub files: Vec<ScannedFile>,
}

impl ScannedChapter {
    /// 生成一章的上传批次，图片在轮到这一章时才读取
    pub fn to_batch(&self, volume: &str) -> ChapterBatch {
        ChapterBatch {
            chapter: ChapterMetadata {
                number: self.number.clone(),
                title: String::new(),
                volume: volume.to_string(),
                group: String::new(),
            },
            files: ChapterFiles::OnDisk(self.files.iter().map(|f| f.local_path.clone()).collect()),
        }
    }

    /// 校验文件数量和大小，规则与单章上传一致
    pub fn validate(&self, max_size: u64, max_files: usize) -> FileValidation {
        let mut errors = Vec::new();

        if self.files.len() > max_files {
            errors.push(format!(
                "{}: {} 个文件，最多允许 {} 个",
                self.folder_name,
                self.files.len(),
                max_files
            ));
        }
        for file in &self.files {
            if file.size > max_size {
                errors.push(format!(
                    "{}/{}: 超过大小上限 {}",
                    self.folder_name,
                    file_name(&file.local_path),
                    format_file_size(max_size)
                ));
            }
        }

        FileValidation {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// 扫描配置
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// 跳过隐藏文件（以.开头的文件和文件夹）
    pub skip_hidden: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { skip_hidden: true }
    }
}

/// 章节文件夹扫描器
#[derive(Debug, Clone, Default)]
pub struct ChapterFolderScanner {
    options: ScanOptions,
}

impl ChapterFolderScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ScanOptions) -> Self {
        Self { options }
    }

    /// 扫描根目录，返回按章节号排序的章节
    pub fn scan<P: AsRef<Path>>(&self, root_path: P) -> Result<Vec<ScannedChapter>> {
        let root_path = root_path.as_ref();

        if !root_path.exists() {
            anyhow::bail!("扫描路径不存在: {}", root_path.display());
        }
        if !root_path.is_dir() {
            anyhow::bail!("扫描路径不是文件夹: {}", root_path.display());
        }

        info!("开始扫描章节文件夹: {}", root_path.display());

        let number_re = Regex::new(r"(\d+)(\.\d+)?")?;
        let mut chapters = Vec::new();

        let entries = std::fs::read_dir(root_path)
            .with_context(|| format!("读取目录失败: {}", root_path.display()))?;
        for entry in entries {
            let entry =
                entry.with_context(|| format!("读取目录条目失败: {}", root_path.display()))?;
            let path = entry.path();
            let folder_name = entry.file_name().to_string_lossy().to_string();

            if self.is_hidden(&folder_name) || !path.is_dir() {
                continue;
            }

            let Some(number) = chapter_number(&number_re, &folder_name) else {
                warn!("文件夹名中没有章节号，跳过: {}", folder_name);
                continue;
            };

            let files = self.scan_images(&path)?;
            if files.is_empty() {
                warn!("章节文件夹中没有图片，跳过: {}", folder_name);
                continue;
            }

            debug!("扫描到章节 {}: {} 张图片", number, files.len());
            chapters.push(ScannedChapter {
                folder_name,
                path,
                number,
                files,
            });
        }

        chapters.sort_by(|a, b| {
            compare_chapter_numbers(&a.number, &b.number)
                .then_with(|| natural_cmp(&a.folder_name, &b.folder_name))
        });

        info!(
            "章节扫描完成: {} 章，共 {} 张图片，总大小 {}",
            chapters.len(),
            chapters.iter().map(|c| c.files.len()).sum::<usize>(),
            format_file_size(chapters.iter().map(|c| c.total_size()).sum())
        );

        Ok(chapters)
    }

    fn is_hidden(&self, name: &str) -> bool {
        self.options.skip_hidden && name.starts_with('.')
    }

    /// 扫描章节文件夹中的图片（不递归）
    fn scan_images(&self, dir: &Path) -> Result<Vec<ScannedFile>> {
        let mut files = Vec::new();

        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("读取目录失败: {}", dir.display()))?
        {
            let entry = entry.with_context(|| format!("读取目录条目失败: {}", dir.display()))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();

            if self.is_hidden(&name) {
                continue;
            }

            let metadata = std::fs::metadata(&path)
                .with_context(|| format!("读取文件元数据失败: {}", path.display()))?;
            if !metadata.is_file() {
                continue;
            }
            if !ALLOWED_IMAGE_TYPES.contains(&mime_from_path(&path)) {
                debug!("跳过非图片文件: {}", path.display());
                continue;
            }

            files.push(ScannedFile {
                local_path: path,
                size: metadata.len(),
            });
        }

        files.sort_by(|a, b| natural_cmp(&file_name(&a.local_path), &file_name(&b.local_path)));
        Ok(files)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// 从文件夹名提取章节号，去掉整数部分的前导零
fn chapter_number(re: &Regex, name: &str) -> Option<String> {
    let caps = re.captures(name)?;
    let integer = caps.get(1)?.as_str().trim_start_matches('0');
    let integer = if integer.is_empty() { "0" } else { integer };
    let fraction = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    Some(format!("{}{}", integer, fraction))
}

fn compare_chapter_numbers(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => natural_cmp(a, b),
    }
}

/// 自然排序：数字段按数值比较
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let mut xs = String::new();
                while let Some(c) = left.peek().copied().filter(char::is_ascii_digit) {
                    xs.push(c);
                    left.next();
                }
                let mut ys = String::new();
                while let Some(c) = right.peek().copied().filter(char::is_ascii_digit) {
                    ys.push(c);
                    right.next();
                }
                let xt = xs.trim_start_matches('0');
                let yt = ys.trim_start_matches('0');
                let ord = xt.len().cmp(&yt.len()).then_with(|| xt.cmp(yt));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }
}
