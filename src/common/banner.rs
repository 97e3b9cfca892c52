use colored::*;

pub fn show() {
    let banner = r#"
    ██████╗  ██████╗  ██████╗███████╗ ██████╗ █████╗ ███╗   ██╗
    ██╔══██╗██╔═══██╗██╔════╝██╔════╝██╔════╝██╔══██╗████╗  ██║
    ██████╔╝██║   ██║██║     ███████╗██║     ███████║██╔██╗ ██║
    ██╔═══╝ ██║   ██║██║     ╚════██║██║     ██╔══██║██║╚██╗██║
    ██║     ╚██████╔╝╚██████╗███████║╚██████╗██║  ██║██║ ╚████║
    ╚═╝      ╚═════╝  ╚═════╝╚══════╝ ╚═════╝╚═╝  ╚═╝╚═╝  ╚═══╝
    "#;

    println!("{}", banner.bright_red());
    println!("    {}", "Template-driven web vulnerability scanner with a task queue".bright_yellow());
    println!("    {}", format!("Version: {}", env!("CARGO_PKG_VERSION")).bright_yellow());
    println!();
}
