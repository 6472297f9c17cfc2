//! 通用工具函数

use chrono::Utc;
use uuid::Uuid;

/// 清理上传文件名，仅保留安全字符
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(['.', '_']).is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// 生成唯一的存储文件名
pub fn unique_filename(original_name: &str) -> String {
    format!(
        "{}_{}_{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        &Uuid::new_v4().simple().to_string()[..8],
        sanitize_filename(original_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("RS-12_left.jpg"), "RS-12_left.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("a b?.png"), "a_b_.png");
        assert_eq!(sanitize_filename("???"), "file");
    }

    #[test]
    fn test_unique_filename_keeps_original_name() {
        let name = unique_filename("scan.png");
        assert!(name.ends_with("_scan.png"));
        assert_ne!(unique_filename("scan.png"), unique_filename("scan.png"));
    }
}
