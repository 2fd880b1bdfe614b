//! CLI command handling
//!
//! Builds the per-process objects (config, parameters, catalog, session)
//! and dispatches commands against them.

use std::io::Read;
use std::path::PathBuf;

use colored::Colorize;

use crate::commands::{Commands, EmailCommands, GlobalOptions, OutputFormat};
use crate::common::config::{Config, ProjectConfig};
use crate::common::{Error, Result};
use crate::session::{
    Email, EmailQuery, EmailRecord, FileStateStore, NullTransport, TestMailer,
    TestSessionEnvironment,
};
use crate::suite::{
    DirectoryManifest, ParameterBag, SuiteCatalog, SuiteLocator, SuiteRegistry, SuiteRequest,
};

/// Everything loaded once per invocation
struct Workspace {
    config: Config,
    root: PathBuf,
    project: ProjectConfig,
    params: ParameterBag,
}

impl Workspace {
    fn load(global: &GlobalOptions) -> Result<Self> {
        let config = Config::load()?;
        let root = config.project_root(global.project.as_deref())?;
        let root = root.canonicalize().unwrap_or(root);
        let project = ProjectConfig::discover(&root, global.config.as_deref())?;
        let params = ParameterBag::from_settings(&project.extension, &root);

        if let Some(path) = &project.path {
            tracing::debug!(path = %path.display(), "Loaded project config");
        }

        Ok(Self {
            config,
            root,
            project,
            params,
        })
    }

    fn mailer(
        &self,
        session: Option<&str>,
    ) -> Result<TestMailer<NullTransport, FileStateStore>> {
        let store = FileStateStore::new(self.config.state_dir());
        let key = self.config.session_key(session);
        tracing::debug!(session = %key, dir = %store.dir().display(), "Using session state");
        Ok(TestMailer::new(
            NullTransport,
            TestSessionEnvironment::new(store, key)?,
        ))
    }
}

/// Dispatch a CLI command
///
/// Returns `Ok(false)` when the command ran but its check did not pass.
pub fn dispatch(global: &GlobalOptions, command: Commands) -> Result<bool> {
    let workspace = Workspace::load(global)?;

    match command {
        Commands::Suites {
            module,
            suite,
            init,
            format,
        } => {
            let catalog = SuiteCatalog::from_suites(&workspace.project.suites, &workspace.params)?;
            let manifest =
                DirectoryManifest::new(&workspace.root, &workspace.config.discovery.vendor_dir);
            let locator = SuiteLocator::new(&catalog, &manifest, &workspace.params);

            let mut registry = SuiteRegistry::new();
            let request = SuiteRequest {
                module,
                suite,
                init,
            };
            locator.execute(&request, &mut registry)?;

            match format {
                OutputFormat::Yaml => print!("{}", serde_yaml::to_string(registry.suites())?),
                OutputFormat::Text => {
                    if registry.is_empty() {
                        println!("No suites registered");
                    }
                    for suite in registry.suites() {
                        match &suite.suite_type {
                            Some(t) => println!("{} ({})", suite.name.bold(), t),
                            None => println!("{}", suite.name.bold()),
                        }
                        if !suite.settings.is_empty() {
                            let settings = serde_yaml::to_string(&suite.settings)?;
                            for line in settings.lines() {
                                println!("  {}", line.dimmed());
                            }
                        }
                    }
                }
            }
            Ok(true)
        }

        Commands::Email(email_cmd) => match email_cmd {
            EmailCommands::Record { file, session } => {
                let mailer = workspace.mailer(session.as_deref())?;
                let json = match &file {
                    Some(path) => {
                        std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?
                    }
                    None => {
                        let mut buf = String::new();
                        std::io::stdin().read_to_string(&mut buf)?;
                        buf
                    }
                };
                let email: Email = serde_json::from_str(&json)?;
                let record = EmailRecord::from_email(&email);
                mailer.record_entry(record.clone())?;

                println!(
                    "Recorded email {} in session {}",
                    describe(&record),
                    mailer.session().key()
                );
                Ok(true)
            }

            EmailCommands::Find {
                to,
                from,
                subject,
                content,
                last,
                json,
                session,
            } => {
                let mailer = workspace.mailer(session.as_deref())?;
                let query = EmailQuery {
                    to,
                    from,
                    subject,
                    content,
                };

                if last {
                    let found = mailer.find_email(&query)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&found)?);
                    } else if let Some(record) = &found {
                        print_email(record);
                    } else {
                        println!("{}", "No matching email".yellow());
                    }
                    return Ok(found.is_some());
                }

                let found = mailer.find_emails(&query)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&found)?);
                } else if found.is_empty() {
                    println!("{}", "No matching emails".yellow());
                } else {
                    println!("{} matching email(s):", found.len());
                    for record in &found {
                        print_email(record);
                    }
                }
                Ok(true)
            }

            EmailCommands::Clear { session } => {
                let mailer = workspace.mailer(session.as_deref())?;
                mailer.clear_emails()?;
                println!(
                    "Cleared captured emails for session {}",
                    mailer.session().key()
                );
                Ok(true)
            }
        },

        Commands::Params => {
            for (name, value) in workspace.params.iter() {
                println!("{} = {}", name.cyan(), serde_json::to_string(value)?);
            }
            Ok(true)
        }
    }
}

fn describe(record: &EmailRecord) -> String {
    format!(
        "'{}' to {}",
        record.subject.as_deref().unwrap_or("(no subject)"),
        record.to.as_deref().unwrap_or("(no recipient)")
    )
}

fn print_email(record: &EmailRecord) {
    println!("{} {}", "✉".green(), describe(record));
    if let Some(from) = &record.from {
        println!("  {} {}", "From:".dimmed(), from);
    }
    if let Some(content) = record.plain_content.as_ref().or(record.content.as_ref()) {
        for line in content.lines().take(5) {
            println!("  {}", line.dimmed());
        }
    }
}
