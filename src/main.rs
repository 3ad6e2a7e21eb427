#[tokio::main]
async fn main() {
    if let Err(e) = diagnosis_ocr_lib::run().await {
        eprintln!("diagnosis-ocr: {e}");
        std::process::exit(1);
    }
}
