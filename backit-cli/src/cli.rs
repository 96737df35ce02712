//! Main backit-cli command line entry points
use crate::{
    identity::HttpIdentityProvider, logging::setup_tracing, paths::config_file, settings::Settings,
};
use anyhow::{Context, Result};
use backit_core::{
    EmailChangeFlow, FlowError, FlowSettings, IdentityProvider, SessionState, VerificationStatus,
};
use clap::{Parser, Subcommand};
use inquire::ui::RenderConfig;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Parser)]
#[command(name = "backit")]
#[command(about = "Manage the email address of your backit account from the command line")]
pub struct Cli {
    #[arg(long, help = "Whether to turn off ansi terminal colors")]
    no_colors: bool,
    #[arg(long, help = "Address of the identity backend, overrides the config file")]
    api_endpoint: Option<Url>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the signed-in account
    Account(AccountCmds),
    /// Change the email address of the signed-in account
    Email(EmailCmds),
    /// Print file paths used by the application (e.g. the path to config)
    Paths,
}

#[derive(Debug, Parser)]
pub struct AccountCmds {
    #[command(subcommand)]
    command: AccountCommands,
}

#[derive(Debug, Subcommand)]
pub enum AccountCommands {
    /// Show the email address and sign-in methods of the signed-in account
    Show,
}

#[derive(Debug, Parser)]
pub struct EmailCmds {
    #[command(subcommand)]
    command: EmailCommands,
}

#[derive(Debug, Subcommand)]
pub enum EmailCommands {
    /// Change your email address via a verification link sent to the new address
    Change(ChangeCommand),
}

#[derive(Debug, Parser)]
pub struct ChangeCommand {
    /// The new email address.
    /// If not provided, you'll be asked for it.
    #[arg(long)]
    email: Option<String>,
}

impl Cli {
    pub async fn run(&self, mut settings: Settings) -> Result<()> {
        let ansi = !self.no_colors;
        setup_tracing(ansi);

        if let Some(api_endpoint) = &self.api_endpoint {
            settings.api_endpoint = api_endpoint.clone();
        }

        tracing::debug!(?settings, "Loaded settings");

        match &self.command {
            Commands::Account(account) => {
                let state = CliState::load(&settings, ansi)?;

                match &account.command {
                    AccountCommands::Show => state.show_account().await?,
                }
            }
            Commands::Email(email) => {
                let state = CliState::load(&settings, ansi)?;

                match &email.command {
                    EmailCommands::Change(change) => {
                        state.change_email(change.email.clone(), &settings.flow).await?
                    }
                }
            }
            Commands::Paths => {
                println!("{}", config_file().display());
            }
        }

        Ok(())
    }
}

/// What happened while waiting for the verification link to be followed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Waited {
    Verified,
    EditAgain,
    Quit,
}

#[derive(Debug)]
pub(crate) struct CliState {
    pub(crate) render_config: RenderConfig,
    pub(crate) provider: Arc<HttpIdentityProvider>,
}

impl CliState {
    fn load(settings: &Settings, colors: bool) -> Result<Self> {
        let render_config = if colors {
            RenderConfig::default_colored()
        } else {
            RenderConfig::empty()
        };

        let provider = Arc::new(
            HttpIdentityProvider::new(settings).context("Setting up the HTTP client")?,
        );

        Ok(Self {
            render_config,
            provider,
        })
    }

    async fn show_account(&self) -> Result<()> {
        let account = self
            .provider
            .current_account()
            .await
            .context("Fetching the signed-in account")?;

        println!("Email: {}", account.email);
        println!(
            "Password sign-in: {}",
            if account.has_password_credential {
                "yes"
            } else {
                "no"
            }
        );
        if account.linked_providers.is_empty() {
            println!("Linked providers: none");
        } else {
            println!("Linked providers: {}", account.linked_providers.join(", "));
        }

        Ok(())
    }

    async fn change_email(&self, email: Option<String>, settings: &FlowSettings) -> Result<()> {
        let flow = EmailChangeFlow::start(self.provider.clone(), settings.clone()).await?;

        if flow.snapshot().state == SessionState::Blocked {
            println!("Your account doesn't have a password. It signs in through another provider only.");
            println!("The email address of such an account can't be changed here.");
            return Ok(());
        }

        println!(
            "Your current email address is {}",
            flow.snapshot().current_email
        );

        let mut preset = email;
        loop {
            let candidate = match preset.take() {
                Some(candidate) => candidate,
                None => inquire::Text::new("What's your new email address?")
                    .with_render_config(self.render_config)
                    .prompt()?,
            };
            flow.set_candidate_email(candidate.clone())?;

            let password = inquire::Password::new("Please confirm with your current password:")
                .without_confirmation()
                .with_render_config(self.render_config)
                .prompt()?;
            flow.set_password(password)?;

            // Ctrl+C while submitting leaves the email address as it is
            let submitted = tokio::select! {
                submitted = flow.submit() => submitted,
                interrupted = tokio::signal::ctrl_c() => {
                    interrupted?;
                    println!("Your email address wasn't changed.");
                    return Ok(());
                }
            };

            match submitted {
                Ok(()) => {}
                Err(FlowError::Rejected(kind)) => {
                    println!("{}", kind.message());
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            println!("We've sent a verification link to {candidate}.");
            println!("Follow it to confirm your new address. Press Ctrl+C for more options.");

            match self.await_verification(&flow).await? {
                Waited::Verified => break,
                Waited::EditAgain => continue,
                Waited::Quit => {
                    println!("Your email address wasn't changed.");
                    return Ok(());
                }
            }
        }

        let sign_out = settings.sign_out_after_verification;
        let new_email = flow.finalize().await?;

        println!("Successfully changed your email address to {new_email}.");
        if sign_out {
            println!("You've been signed out. Please sign in again with your new email address.");
        }

        Ok(())
    }

    async fn await_verification(
        &self,
        flow: &EmailChangeFlow<HttpIdentityProvider>,
    ) -> Result<Waited> {
        let mut updates = flow.subscribe();

        loop {
            tokio::select! {
                verified = updates.wait_for(|s| s.state == SessionState::Verified) => {
                    verified?;
                    return Ok(Waited::Verified);
                }
                interrupted = tokio::signal::ctrl_c() => {
                    interrupted?;

                    let options = vec!["Check now", "Use a different address", "Quit"];
                    let choice = inquire::Select::new("Still waiting for verification. What now?", options)
                        .with_render_config(self.render_config)
                        .prompt()?;

                    match choice {
                        "Check now" => match flow.check_now().await {
                            Ok(VerificationStatus::Verified) => return Ok(Waited::Verified),
                            Ok(VerificationStatus::NotYetVerified) => {
                                println!("Your new address isn't verified yet.");
                            }
                            Err(FlowError::Provider(e)) => {
                                println!("Couldn't check the verification status: {e}");
                            }
                            Err(e) => return Err(e.into()),
                        },
                        "Use a different address" => {
                            if flow.cancel() == SessionState::Verified {
                                return Ok(Waited::Verified);
                            }
                            return Ok(Waited::EditAgain);
                        }
                        _ => {
                            if flow.cancel() == SessionState::Verified {
                                return Ok(Waited::Verified);
                            }
                            return Ok(Waited::Quit);
                        }
                    }
                }
            }
        }
    }
}
