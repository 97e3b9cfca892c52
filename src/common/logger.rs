use std::fs::File;
use std::io::Write;
use std::path::Path;
use chrono::Local;
use env_logger::{Builder, Target};
use log::{info, LevelFilter};

/// 初始化日志：-v 输出 debug，-s 只输出 error
pub fn init(verbose: bool, silent: bool, log_file: Option<&Path>) -> std::io::Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else if silent {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    builder.filter_level(level);
    // http 栈自身的日志太多，只保留警告
    for noisy in ["hyper", "hyper_util", "reqwest", "rustls", "h2"] {
        builder.filter_module(noisy, LevelFilter::Warn);
    }

    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            builder.target(Target::Pipe(Box::new(file)));
        }
        None => {
            builder.target(Target::Stderr);
        }
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });

    // 测试中可能被重复初始化
    if builder.try_init().is_ok() {
        if let Some(path) = log_file {
            info!("Logging to file: {}", path.display());
        }
    }

    Ok(())
}
