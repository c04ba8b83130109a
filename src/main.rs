fn main() -> anyhow::Result<()> {
    doc_upload_injector::run()
}
