fn main() {
    // 只有在 ESP-IDF 目标上才需要导出 esp-idf-sys 的链接参数
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}
