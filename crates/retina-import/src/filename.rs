//! 影像文件名身份提取
//!
//! 约定格式：`<前缀>-<数字ID>_<left|right>.<扩展名>`，不区分大小写。

use retina_core::models::EyeSide;

/// 从文件名提取受试者ID和眼别
///
/// 不符合约定的文件名返回None，由调用方跳过。
pub fn extract_identity(filename: &str) -> Option<(i32, EyeSide)> {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename);
    let lower = stem.to_lowercase();

    let (code, eye_side) = if let Some(code) = lower.strip_suffix("_left") {
        (code, EyeSide::Left)
    } else if let Some(code) = lower.strip_suffix("_right") {
        (code, EyeSide::Right)
    } else {
        return None;
    };

    let (_, digits) = code.rsplit_once('-')?;
    let patient_id: i32 = digits.parse().ok()?;
    Some((patient_id, eye_side))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_id_and_eye_side() {
        assert_eq!(extract_identity("RS-12_left.jpg"), Some((12, EyeSide::Left)));
        assert_eq!(extract_identity("rs-7_RIGHT.png"), Some((7, EyeSide::Right)));
        assert_eq!(extract_identity("STUDY-305_right.jpeg"), Some((305, EyeSide::Right)));
    }

    #[test]
    fn test_unrecognized_names_are_rejected() {
        assert_eq!(extract_identity("notes.txt"), None);
        assert_eq!(extract_identity("RS-12.jpg"), None); // 缺少眼别标记
        assert_eq!(extract_identity("RS-abc_left.jpg"), None); // 非数字ID
        assert_eq!(extract_identity("12_left.jpg"), None); // 缺少前缀
    }
}
