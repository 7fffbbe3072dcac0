use miette::Result;
use npmlocal_core::version::version_string;

pub fn run(json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({ "ok": true, "version": npmlocal_core::VERSION })
        );
    } else {
        println!("{}", version_string());
    }
    Ok(())
}
