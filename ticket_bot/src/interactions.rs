//! Slash commands, buttons, select menus and modals.
//!
//! Custom ids carry all the state a multi-step form needs, so a restart
//! between steps does not lose anything.

use std::sync::Arc;

use chrono::Utc;
use discord_api::{
    types::{
        component::{TEXT_INPUT_PARAGRAPH, TEXT_INPUT_SHORT},
        interaction::{
            APPLICATION_COMMAND, MESSAGE_COMPONENT, MODAL_SUBMIT, OPTION_STRING, OPTION_USER,
        },
    },
    ApplicationCommand, Component, CreateMessage, DiscordClient, Interaction,
    InteractionResponse, InteractionsApi, MessagesApi, Permissions, SelectOption,
};
use tracing::{debug, info, warn};

use crate::{
    config::BotConfig,
    embeds,
    error::BotError,
    model::NewTicket,
    suggestions::SuggestionService,
    tickets::{AddOutcome, TicketService},
};

const SUBMISSION_PREFIX: &str = "ticket_submission:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentRoute {
    OpenTicketForm,
    SelectCategory,
    SelectGame { category: String },
    SelectServer { category: String, game: String },
    CloseTicket(i64),
    ReopenTicket(i64),
    Transcript(i64),
    ReassignOwner(i64),
    SelectNewOwner(i64),
    SuggestionModal(String),
}

impl ComponentRoute {
    pub fn parse(custom_id: &str) -> Option<Self> {
        let id = |rest: &str| rest.parse::<i64>().ok();
        if custom_id == "open_ticket_form" {
            return Some(Self::OpenTicketForm);
        }
        if custom_id == "ticket_category" {
            return Some(Self::SelectCategory);
        }
        if let Some(category) = custom_id.strip_prefix("ticket_game:") {
            return Some(Self::SelectGame {
                category: category.to_string(),
            });
        }
        if let Some(rest) = custom_id.strip_prefix("ticket_server:") {
            let (category, game) = rest.split_once(':')?;
            return Some(Self::SelectServer {
                category: category.to_string(),
                game: game.to_string(),
            });
        }
        if let Some(rest) = custom_id.strip_prefix("close_ticket_") {
            return id(rest).map(Self::CloseTicket);
        }
        if let Some(rest) = custom_id.strip_prefix("reopen_ticket_") {
            return id(rest).map(Self::ReopenTicket);
        }
        if let Some(rest) = custom_id.strip_prefix("transcript_") {
            return id(rest).map(Self::Transcript);
        }
        if let Some(rest) = custom_id.strip_prefix("reassign_owner_") {
            return id(rest).map(Self::ReassignOwner);
        }
        if let Some(rest) = custom_id.strip_prefix("select_new_owner_") {
            return id(rest).map(Self::SelectNewOwner);
        }
        if let Some(game) = custom_id.strip_prefix("suggestion-modal-") {
            return (!game.is_empty()).then(|| Self::SuggestionModal(game.to_string()));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalRoute {
    TicketSubmission {
        category: String,
        game: String,
        server: String,
    },
    SubmitSuggestion(String),
}

impl ModalRoute {
    pub fn parse(custom_id: &str) -> Option<Self> {
        if let Some(rest) = custom_id.strip_prefix(SUBMISSION_PREFIX) {
            // Servers may contain ':'; categories and game keys may not.
            let mut parts = rest.splitn(3, ':');
            let category = parts.next()?.to_string();
            let game = parts.next()?.to_string();
            let server = parts.next()?.to_string();
            return Some(Self::TicketSubmission {
                category,
                game,
                server,
            });
        }
        custom_id
            .strip_prefix("submit-suggestion-")
            .filter(|game| !game.is_empty())
            .map(|game| Self::SubmitSuggestion(game.to_string()))
    }
}

/// Guild commands registered on READY.
pub fn commands() -> Vec<ApplicationCommand> {
    vec![
        ApplicationCommand::new("ping", "Check that the bot is alive"),
        ApplicationCommand::new("ticket-setup", "Post the Create Ticket panel in this channel")
            .requires(Permissions::ADMINISTRATOR),
        ApplicationCommand::new("suggestion-setup", "Post the suggestion button for a game")
            .option(OPTION_STRING, "game", "Game key from the bot configuration", true)
            .requires(Permissions::ADMINISTRATOR),
        ApplicationCommand::new("addtoticket", "Give a user access to this ticket")
            .option(OPTION_USER, "user", "User to add", true),
        ApplicationCommand::new("delete", "Delete a message and post the reason")
            .option(OPTION_STRING, "message_id", "Id of the message to delete", true)
            .option(OPTION_STRING, "reason", "Reason shown in the channel", true)
            .requires(Permissions::MANAGE_MESSAGES),
    ]
}

pub fn category_menu(config: &BotConfig) -> CreateMessage {
    let options = config
        .ticket_categories
        .iter()
        .map(|c| SelectOption::new(c.as_str(), c.as_str()))
        .collect();
    CreateMessage::text("**Step 1 of 3:** What is your ticket about?")
        .components(vec![Component::action_row(vec![Component::string_select(
            "ticket_category",
            "Select a category",
            options,
        )])])
        .ephemeral()
}

pub fn game_menu(config: &BotConfig, category: &str) -> CreateMessage {
    let mut options: Vec<SelectOption> = config
        .games
        .iter()
        .map(|g| SelectOption::new(g.label.as_str(), g.key.as_str()))
        .collect();
    if options.is_empty() {
        options.push(SelectOption::new("Other", "other"));
    }
    CreateMessage::text(format!("**Step 2 of 3:** Which game is this `{category}` ticket for?"))
        .components(vec![Component::action_row(vec![Component::string_select(
            format!("ticket_game:{category}"),
            "Select a game",
            options,
        )])])
}

pub fn server_menu(config: &BotConfig, category: &str, game: &str) -> CreateMessage {
    let options = config
        .servers_for(game)
        .into_iter()
        .map(|s| SelectOption::new(s.clone(), s))
        .collect();
    CreateMessage::text("**Step 3 of 3:** Which server are you playing on?").components(vec![
        Component::action_row(vec![Component::string_select(
            format!("ticket_server:{category}:{game}"),
            "Select a server",
            options,
        )]),
    ])
}

pub fn ticket_form(category: &str, game: &str, server: &str) -> InteractionResponse {
    InteractionResponse::modal(
        format!("{SUBMISSION_PREFIX}{category}:{game}:{server}"),
        "Create a Ticket",
        vec![
            Component::action_row(vec![Component::text_input(
                "ticket_subject",
                "Subject",
                TEXT_INPUT_SHORT,
            )
            .with_placeholder("Short summary of the issue")
            .with_length(Some(3), Some(100))]),
            Component::action_row(vec![Component::text_input(
                "ticket_description",
                "Description",
                TEXT_INPUT_PARAGRAPH,
            )
            .with_placeholder("What happened? Include times, locations and item names.")
            .with_length(Some(10), Some(1000))]),
        ],
    )
}

pub fn suggestion_form(game_label: &str, game: &str) -> InteractionResponse {
    InteractionResponse::modal(
        format!("submit-suggestion-{game}"),
        format!("New Suggestion for {}", game_label.to_uppercase()),
        vec![
            Component::action_row(vec![Component::text_input(
                "suggestion-title",
                "Title",
                TEXT_INPUT_SHORT,
            )
            .with_length(None, Some(100))]),
            Component::action_row(vec![Component::text_input(
                "suggestion-description",
                "Describe your suggestion",
                TEXT_INPUT_PARAGRAPH,
            )
            .with_length(None, Some(1500))]),
        ],
    )
}

fn is_bot_admin(config: &BotConfig, interaction: &Interaction) -> bool {
    interaction.invoker_id().is_some_and(|id| config.is_admin_user(id))
        || interaction
            .member
            .as_ref()
            .is_some_and(|m| m.has_role(&config.admin.role_id))
}

fn ephemeral(content: impl Into<String>) -> CreateMessage {
    CreateMessage::text(content).no_mentions().ephemeral()
}

#[derive(Clone)]
pub struct InteractionRouter {
    client: DiscordClient,
    config: Arc<BotConfig>,
    tickets: TicketService,
    suggestions: Arc<SuggestionService>,
}

impl InteractionRouter {
    pub fn new(
        client: DiscordClient,
        config: Arc<BotConfig>,
        tickets: TicketService,
        suggestions: Arc<SuggestionService>,
    ) -> Self {
        Self {
            client,
            config,
            tickets,
            suggestions,
        }
    }

    pub async fn handle(&self, interaction: &Interaction) {
        let result = match interaction.kind {
            APPLICATION_COMMAND => self.on_command(interaction).await,
            MESSAGE_COMPONENT => self.on_component(interaction).await,
            MODAL_SUBMIT => self.on_modal(interaction).await,
            other => {
                debug!(kind = other, "ignoring interaction");
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(
                interaction_id = %interaction.id,
                command = ?interaction.command_name(),
                custom_id = ?interaction.custom_id(),
                error = %e,
                "interaction failed"
            );
            let text = match &e {
                BotError::NotFound(_) => "❌ That ticket or message no longer exists.",
                _ => "❌ Something went wrong, please try again later.",
            };
            // Depending on where it failed the interaction may already be
            // acknowledged.
            if interaction.reply(text, true).await.is_err() {
                let _ = interaction.followup(ephemeral(text)).await;
            }
        }
    }

    async fn on_command(&self, interaction: &Interaction) -> Result<(), BotError> {
        match interaction.command_name().unwrap_or_default() {
            "ping" => interaction.reply("🏓 Pong!", true).await?,
            "ticket-setup" => self.ticket_setup(interaction).await?,
            "suggestion-setup" => self.suggestion_setup(interaction).await?,
            "addtoticket" => self.add_to_ticket(interaction).await?,
            "delete" => self.delete_message(interaction).await?,
            other => debug!(command = other, "unknown command"),
        }
        Ok(())
    }

    async fn ticket_setup(&self, interaction: &Interaction) -> Result<(), BotError> {
        let Some(channel) = interaction.channel_id.as_deref() else {
            return Ok(());
        };
        let (embed, rows) = embeds::ticket_panel();
        self.client
            .create_message(channel, CreateMessage::embed(embed).components(rows))
            .await?;
        interaction.reply("✅ Ticket button has been posted!", true).await?;
        Ok(())
    }

    async fn suggestion_setup(&self, interaction: &Interaction) -> Result<(), BotError> {
        let Some(channel) = interaction.channel_id.as_deref() else {
            return Ok(());
        };
        let key = interaction.option_str("game").unwrap_or_default();
        let Some(game) = self.config.game(&key) else {
            interaction.reply(&format!("❌ Unknown game `{key}`."), true).await?;
            return Ok(());
        };
        if game.suggestion_channel_id.is_none() {
            interaction
                .reply(&format!("❌ No suggestion channel is configured for {}.", game.label), true)
                .await?;
            return Ok(());
        }
        let (embed, rows) = embeds::suggestion_panel(&game.label, &game.key);
        self.client
            .create_message(channel, CreateMessage::embed(embed).components(rows))
            .await?;
        interaction.reply("✅ Suggestion button has been posted!", true).await?;
        Ok(())
    }

    async fn add_to_ticket(&self, interaction: &Interaction) -> Result<(), BotError> {
        if !is_bot_admin(&self.config, interaction) {
            interaction
                .reply("❌ You do not have permission to execute this command.", true)
                .await?;
            return Ok(());
        }
        let channel = interaction.channel_id.as_deref().unwrap_or_default();
        if self.tickets.store().find_ticket_by_channel(channel).await?.is_none() {
            interaction
                .reply("❌ This command can only be used inside a ticket channel.", true)
                .await?;
            return Ok(());
        }
        let Some(user) = interaction.option_str("user") else {
            return Ok(());
        };
        match self.tickets.add_to_ticket(channel, &user).await? {
            AddOutcome::AlreadyPresent => {
                interaction
                    .reply("❌ This user already has access to the ticket.", true)
                    .await?
            }
            AddOutcome::Added => {
                interaction
                    .reply(&format!("✅ <@{user}> has been added to this ticket!"), false)
                    .await?
            }
        }
        Ok(())
    }

    async fn delete_message(&self, interaction: &Interaction) -> Result<(), BotError> {
        let is_admin_role = interaction
            .member
            .as_ref()
            .is_some_and(|m| m.has_role(&self.config.admin.role_id));
        if !is_admin_role {
            interaction
                .reply("❌ You do not have permission to execute this command.", true)
                .await?;
            return Ok(());
        }
        let channel = interaction.channel_id.as_deref().unwrap_or_default();
        let message_id = interaction.option_str("message_id").unwrap_or_default();
        let reason = interaction.option_str("reason").unwrap_or_default();
        if message_id.is_empty() || !message_id.bytes().all(|b| b.is_ascii_digit()) {
            interaction.reply("❌ Invalid message ID format.", true).await?;
            return Ok(());
        }
        if let Err(e) = self.client.fetch_message(channel, &message_id).await {
            debug!(message_id = %message_id, error = %e, "message to delete not found");
            interaction
                .reply("❌ Could not find the specified message.", true)
                .await?;
            return Ok(());
        }
        self.client
            .create_message(channel, CreateMessage::embed(embeds::deletion_reason(&reason)))
            .await?;
        self.client.delete_message(channel, &message_id).await?;
        info!(channel_id = channel, message_id = %message_id, "message deleted by admin");
        interaction.reply("✅ Message deleted and reason posted.", true).await?;
        Ok(())
    }

    async fn on_component(&self, interaction: &Interaction) -> Result<(), BotError> {
        let custom_id = interaction.custom_id().unwrap_or_default();
        let Some(route) = ComponentRoute::parse(custom_id) else {
            debug!(custom_id, "unknown component");
            return Ok(());
        };
        let first_value = || interaction.selected_values().first().cloned().unwrap_or_default();

        match route {
            ComponentRoute::OpenTicketForm => {
                let registered = match interaction.invoker_id() {
                    Some(id) => self.suggestions.is_registered(id).await?,
                    None => false,
                };
                let response = if registered {
                    category_menu(&self.config)
                } else {
                    ephemeral("🚫 You must register an account before creating a ticket.")
                };
                interaction.respond(InteractionResponse::message(response)).await?;
            }
            ComponentRoute::SelectCategory => {
                let menu = game_menu(&self.config, &first_value());
                interaction.respond(InteractionResponse::update(menu)).await?;
            }
            ComponentRoute::SelectGame { category } => {
                let menu = server_menu(&self.config, &category, &first_value());
                interaction.respond(InteractionResponse::update(menu)).await?;
            }
            ComponentRoute::SelectServer { category, game } => {
                interaction
                    .respond(ticket_form(&category, &game, &first_value()))
                    .await?;
            }
            ComponentRoute::CloseTicket(id) => self.close(interaction, id).await?,
            ComponentRoute::ReopenTicket(id) => self.reopen(interaction, id).await?,
            ComponentRoute::Transcript(id) => self.transcript(interaction, id).await?,
            ComponentRoute::ReassignOwner(id) => self.offer_owners(interaction, id).await?,
            ComponentRoute::SelectNewOwner(id) => {
                self.reassign(interaction, id, &first_value()).await?
            }
            ComponentRoute::SuggestionModal(game) => {
                let registered = match interaction.invoker_id() {
                    Some(id) => self.suggestions.is_registered(id).await?,
                    None => false,
                };
                if !registered {
                    interaction
                        .reply("🚫 You must register an account before making suggestions.", true)
                        .await?;
                    return Ok(());
                }
                let label = self
                    .config
                    .game(&game)
                    .map_or(game.as_str(), |g| g.label.as_str());
                interaction.respond(suggestion_form(label, &game)).await?;
            }
        }
        Ok(())
    }

    async fn close(&self, interaction: &Interaction, id: i64) -> Result<(), BotError> {
        let now = Utc::now();
        match self.tickets.close_ticket(id, now).await? {
            Some(ticket) => {
                interaction
                    .reply(
                        "✅ Ticket has been marked as closed. This channel will be deleted shortly.",
                        true,
                    )
                    .await?;
                let closed_by = interaction.invoker_id().unwrap_or_default();
                self.tickets.post_closure_log(&ticket, closed_by, now).await;
            }
            None => interaction.reply("ℹ️ This ticket is already closed.", true).await?,
        }
        Ok(())
    }

    async fn reopen(&self, interaction: &Interaction, id: i64) -> Result<(), BotError> {
        interaction.defer(true).await?;
        if !self.tickets.reopen_ticket(id, Utc::now()).await? {
            interaction
                .followup(ephemeral(format!("ℹ️ Ticket #{id} is already open.")))
                .await?;
            return Ok(());
        }
        // The closure log entry goes away with the reopen.
        if let Some(log) = &interaction.message {
            if let Err(e) = self.client.delete_message(&log.channel_id, &log.id).await {
                warn!(ticket_id = id, error = %e, "failed to delete closure log entry");
            }
        }
        interaction
            .followup(ephemeral(format!("🔓 Ticket #{id} has been reopened!")))
            .await?;
        Ok(())
    }

    async fn transcript(&self, interaction: &Interaction, id: i64) -> Result<(), BotError> {
        interaction.defer(true).await?;
        let (file_name, bytes) = self.tickets.transcript(id).await?;
        self.client
            .create_followup_file(
                &interaction.application_id,
                &interaction.token,
                &file_name,
                bytes,
                Some(ephemeral(format!("📜 Here's the transcript for Ticket #{id}:"))),
            )
            .await?;
        Ok(())
    }

    async fn offer_owners(&self, interaction: &Interaction, id: i64) -> Result<(), BotError> {
        interaction.defer(true).await?;
        let ticket = self
            .tickets
            .store()
            .get_ticket(id)
            .await?
            .ok_or_else(|| BotError::NotFound(format!("ticket {id}")))?;
        let options: Vec<SelectOption> = self
            .tickets
            .eligible_owners(&ticket)
            .await?
            .into_iter()
            .filter(|p| p.discord_id.as_deref() != ticket.owner_ref.as_deref())
            .filter_map(|p| {
                let discord_id = p.discord_id?;
                Some(
                    SelectOption::new(p.display_name.clone(), discord_id)
                        .description(format!("Assign ownership to {}", p.display_name)),
                )
            })
            .take(25)
            .collect();
        if options.is_empty() {
            interaction
                .followup(ephemeral("No eligible users found in this ticket."))
                .await?;
            return Ok(());
        }
        let menu = ephemeral("Pick the new owner for this ticket:").components(vec![
            Component::action_row(vec![Component::string_select(
                format!("select_new_owner_{id}"),
                "Select the new owner",
                options,
            )]),
        ]);
        interaction.followup(menu).await?;
        Ok(())
    }

    async fn reassign(&self, interaction: &Interaction, id: i64, owner: &str) -> Result<(), BotError> {
        interaction.defer(true).await?;
        if let Err(e) = self.tickets.reassign_owner(id, owner, Utc::now()).await {
            if e.is_not_found() {
                interaction
                    .followup(ephemeral("❌ That user has no registered account."))
                    .await?;
                return Ok(());
            }
            return Err(e);
        }
        let ticket = self
            .tickets
            .store()
            .get_ticket(id)
            .await?
            .ok_or_else(|| BotError::NotFound(format!("ticket {id}")))?;
        let text = if self.tickets.refresh_owner_in_channel(&ticket, owner).await? {
            format!("✅ Ticket #{id} now belongs to <@{owner}>.")
        } else {
            "❌ Could not find the original ticket embed.".to_string()
        };
        interaction.followup(ephemeral(text)).await?;
        Ok(())
    }

    async fn on_modal(&self, interaction: &Interaction) -> Result<(), BotError> {
        let custom_id = interaction.custom_id().unwrap_or_default();
        let Some(route) = ModalRoute::parse(custom_id) else {
            debug!(custom_id, "unknown modal");
            return Ok(());
        };
        match route {
            ModalRoute::TicketSubmission {
                category,
                game,
                server,
            } => {
                let form = NewTicket {
                    subject: interaction.modal_value("ticket_subject").unwrap_or_default().trim().to_string(),
                    description: interaction
                        .modal_value("ticket_description")
                        .unwrap_or_default()
                        .trim()
                        .to_string(),
                    category,
                    game,
                    server,
                    owner_ref: interaction.invoker_id().map(str::to_string),
                };
                let ticket = self.tickets.create_ticket(form, Utc::now()).await?;
                interaction
                    .reply(
                        &format!(
                            "✅ Ticket #{} has been created! Your private channel will open shortly.",
                            ticket.id
                        ),
                        true,
                    )
                    .await?;
            }
            ModalRoute::SubmitSuggestion(game) => {
                let Some(author) = interaction.invoker() else {
                    return Ok(());
                };
                interaction.defer(true).await?;
                let title = interaction.modal_value("suggestion-title").unwrap_or_default().trim();
                let description = interaction
                    .modal_value("suggestion-description")
                    .unwrap_or_default()
                    .trim();
                let suggestion = self
                    .suggestions
                    .submit(&game, title, description, author, Utc::now())
                    .await?;
                interaction
                    .followup(ephemeral(format!(
                        "✅ Your suggestion was successfully submitted to <#{}>.",
                        suggestion.channel_ref
                    )))
                    .await?;
            }
        }
        Ok(())
    }
}
