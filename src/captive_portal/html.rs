//! 内嵌 HTML 静态资源

/// 配网表单，GET 提交到当前地址
pub const FORM_HTML: &str =
    r#"<html><meta charset="utf-8"><form accept-charset="utf-8">SSID:<input name="s"/>PSK:<input name="p"/><input type="submit"/></html>"#;
