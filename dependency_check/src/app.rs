use crate::{
    preflight::{check, install, Installer, Resolver},
    report,
};
use std::{
    collections::BTreeMap,
    io::{self, BufRead, Write},
    process::ExitCode,
};

/// Reports missing dependencies, installs them with or without asking, then
/// checks again. Returns whether everything is satisfied at the end.
pub fn run(
    dependencies: &BTreeMap<String, String>,
    resolver: &impl Resolver,
    installer: &impl Installer,
    auto_install: bool,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> io::Result<bool> {
    let missing = check(resolver, dependencies);

    if missing.is_empty() {
        report::success(out, "All dependencies are satisfied!")?;
        return Ok(true);
    }

    report::warning(out, "Missing dependencies detected:")?;
    for dependency in &missing {
        writeln!(
            out,
            " - {} (provides {})",
            dependency.package, dependency.requirement
        )?;
    }

    for dependency in &missing {
        if auto_install {
            report::progress(out, &format!("Auto-installing {}...", dependency.package))?;
        } else if confirm(input, out, &dependency.package)? {
            report::progress(out, &format!("Installing {}...", dependency.package))?;
        } else {
            report::warning(out, "Installation cancelled")?;
            continue;
        }

        if install(installer, std::slice::from_ref(&dependency.package)) {
            report::success(out, "Installation completed!")?;
        } else {
            tracing::error!("Failed to install {}", dependency.package);
            report::failure(out, "Error occurred during installation!")?;
        }
    }

    let still_missing = check(resolver, dependencies);
    if still_missing.is_empty() {
        report::success(out, "All packages are installed! You can use all detectors!")?;
        return Ok(true);
    }

    report::failure(
        out,
        "Some packages are not installed! Please, rerun this check!",
    )?;
    Ok(false)
}

/// Non-zero while anything is still missing, so scripts can gate on it.
pub fn exit_code(satisfied: bool) -> ExitCode {
    if satisfied {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn confirm(input: &mut impl BufRead, out: &mut impl Write, package: &str) -> io::Result<bool> {
    write!(out, "\nDo you want to install {}? [y/n]: ", package)?;
    out.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::tests::{dependencies, MockEnvironment};
    use std::io::Cursor;

    fn provides() -> [(&'static str, &'static str); 3] {
        [
            ("libclang-dev", "clang"),
            ("libopencv-dev", "opencv4"),
            ("pkg-config", "pkg-config"),
        ]
    }

    fn run_with(env: &MockEnvironment, auto_install: bool, answers: &str) -> (bool, String) {
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut out = Vec::new();
        let satisfied = run(&dependencies(), env, env, auto_install, &mut input, &mut out).unwrap();
        (satisfied, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_nothing_missing() {
        let env = MockEnvironment::new(&["clang", "opencv4", "pkg-config"], &provides());

        let (satisfied, out) = run_with(&env, false, "");

        assert!(satisfied);
        assert!(out.contains("All dependencies are satisfied!"));
        assert!(env.installs.borrow().is_empty());
    }

    #[test]
    fn test_auto_install_installs_each_package() {
        let env = MockEnvironment::new(&["pkg-config"], &provides());

        let (satisfied, out) = run_with(&env, true, "");

        assert!(satisfied);
        assert_eq!(
            *env.installs.borrow(),
            vec![
                vec!["libclang-dev".to_string()],
                vec!["libopencv-dev".to_string()],
            ]
        );
        assert!(out.contains("All packages are installed!"));
    }

    #[test]
    fn test_prompt_declined_package_is_skipped() {
        let env = MockEnvironment::new(&["pkg-config"], &provides());

        let (satisfied, out) = run_with(&env, false, "n\ny\n");

        assert!(!satisfied);
        assert_eq!(
            *env.installs.borrow(),
            vec![vec!["libopencv-dev".to_string()]]
        );
        assert!(out.contains("Installation cancelled"));
        assert!(out.contains("Please, rerun"));
    }

    #[test]
    fn test_failed_install_does_not_stop_the_rest() {
        let mut env = MockEnvironment::new(&["pkg-config"], &provides());
        env.failing.insert("libclang-dev".to_string());

        let (satisfied, out) = run_with(&env, true, "");

        assert!(!satisfied);
        assert_eq!(env.installs.borrow().len(), 2);
        assert!(out.contains("Error occurred during installation!"));
        assert!(env.present.borrow().contains("opencv4"));
    }

    #[test]
    fn test_exit_code_fails_while_packages_remain_missing() {
        let env = MockEnvironment::new(&["pkg-config"], &provides());

        let (satisfied, _) = run_with(&env, false, "n\nn\n");

        assert!(env.installs.borrow().is_empty());
        assert_eq!(exit_code(satisfied), ExitCode::FAILURE);

        let env = MockEnvironment::new(&["clang", "opencv4", "pkg-config"], &provides());
        let (satisfied, _) = run_with(&env, false, "");
        assert_eq!(exit_code(satisfied), ExitCode::SUCCESS);
    }
}
