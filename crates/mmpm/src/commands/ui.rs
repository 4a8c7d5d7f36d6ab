//! Console output helpers for consistent CLI formatting.

use crate::remote::RemoteDetails;
use console::{style, StyledObject};
use mmpm_types::Package;

/// Print a success message with green checkmark.
pub fn success(msg: impl std::fmt::Display) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an info/action message with blue arrow.
pub fn info(msg: impl std::fmt::Display) {
    println!("{} {}", style("→").blue().bold(), msg);
}

/// Print a warning message with yellow exclamation.
pub fn warn(msg: impl std::fmt::Display) {
    println!("{} {}", style("!").yellow().bold(), msg);
}

/// Print a failure with red cross.
pub fn error(msg: impl std::fmt::Display) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Print a dim hint message.
pub fn hint(msg: impl std::fmt::Display) {
    println!("{} {}", style("→").dim(), msg);
}

/// Style text as a package name (cyan).
pub fn pkg(name: impl std::fmt::Display) -> StyledObject<String> {
    style(name.to_string()).cyan()
}

/// Style text as a count (cyan).
pub fn num<T: std::fmt::Display>(n: T) -> StyledObject<String> {
    style(n.to_string()).cyan()
}

/// Style text as dimmed/secondary.
pub fn dim(text: impl std::fmt::Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}

/// Print a section header.
pub fn header(title: impl std::fmt::Display) {
    println!("{}", style(title.to_string()).bold().underlined());
    println!();
}

/// Print a table separator line.
pub fn separator(width: usize) {
    println!("{}", style("─".repeat(width)).dim());
}

/// One line per package: title, then the description unless `title_only`.
pub fn package_line(package: &Package, title_only: bool) {
    if title_only {
        println!("{}", pkg(package.title()));
        return;
    }

    println!("{} {}", pkg(package.title()), dim(format!("({})", package.category)));
    println!("  {}", package.description);
}

/// Every field of a package.
pub fn package_details(package: &Package) {
    println!("{}", pkg(package.title()).bold());
    for (label, value) in [
        ("Category", package.category.as_str()),
        ("Author", package.author()),
        ("Repository", package.repository()),
        ("Description", package.description.as_str()),
    ] {
        println!("  {:<12} {}", dim(label), value);
    }
    println!(
        "  {:<12} {}",
        dim("Installed"),
        if package.is_installed { "yes" } else { "no" }
    );
    if package.is_installed {
        println!("  {:<12} {}", dim("Directory"), package.directory.display());
    }
}

pub fn remote_details(details: &RemoteDetails) {
    for (label, value) in details.fields() {
        println!("  {:<12} {}", dim(label), num(value));
    }
}
