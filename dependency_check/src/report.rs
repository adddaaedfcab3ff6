use std::io::{self, Write};

const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const BLUE: &str = "\x1b[94m";
const RED: &str = "\x1b[91m";
const RESET: &str = "\x1b[0m";

pub fn success(out: &mut impl Write, message: &str) -> io::Result<()> {
    writeln!(out, "{GREEN}{message}{RESET}")
}

pub fn warning(out: &mut impl Write, message: &str) -> io::Result<()> {
    writeln!(out, "{YELLOW}{message}{RESET}")
}

pub fn progress(out: &mut impl Write, message: &str) -> io::Result<()> {
    writeln!(out, "{BLUE}{message}{RESET}")
}

pub fn failure(out: &mut impl Write, message: &str) -> io::Result<()> {
    writeln!(out, "{RED}{message}{RESET}")
}
