fn main() {
    // Embed Windows resources (manifest requesting elevation)
    if std::env::var("CARGO_CFG_TARGET_OS").map(|os| os == "windows").unwrap_or(false) {
        embed_resource::compile("resources/app.rc", embed_resource::NONE);
    }
}
