//! Line-oriented front end for the management page.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use super::page::ManagementPage;
use super::table::render_table;
use crate::model::UserId;

const HELP: &str = "\
commands:
  list              show users
  add               add a user
  edit <id>         edit a user
  delete <id>       delete a user
  help              show this help
  quit              leave
in forms, an empty answer keeps the current value and `.` cancels";

pub struct Shell<R, W> {
    page: ManagementPage,
    input: Lines<R>,
    out: W,
}

impl<R, W> Shell<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(page: ManagementPage, input: R, out: W) -> Self {
        Self {
            page,
            input: input.lines(),
            out,
        }
    }

    pub fn page(&self) -> &ManagementPage {
        &self.page
    }

    pub fn into_parts(self) -> (ManagementPage, W) {
        (self.page, self.out)
    }

    /// Read commands until `quit` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        writeln!(self.out, "type `help` for commands")?;
        loop {
            write!(self.out, "> ")?;
            self.out.flush()?;
            let Some(line) = self.input.next_line().await? else {
                break;
            };
            if !self.execute(line.trim()).await? {
                break;
            }
        }
        Ok(())
    }

    /// Run one command. Returns `false` when the shell should stop.
    pub async fn execute(&mut self, line: &str) -> Result<bool> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(true);
        };
        let arg = words.next();

        match command {
            "list" | "ls" => {
                let table = render_table(&self.page.users());
                write!(self.out, "{}", table)?;
            }
            "add" => {
                self.page.handle_add();
                self.fill_form().await?;
            }
            "edit" => {
                let Some(id) = self.parse_id(arg)? else {
                    return Ok(true);
                };
                match self.page.reconciler().snapshot().get(id).cloned() {
                    Some(user) => {
                        self.page.handle_edit(&user);
                        self.fill_form().await?;
                    }
                    None => writeln!(self.out, "no user with id {}", id)?,
                }
            }
            "delete" | "rm" => {
                let Some(id) = self.parse_id(arg)? else {
                    return Ok(true);
                };
                match self.page.reconciler().snapshot().get(id).cloned() {
                    Some(user) => {
                        self.page.handle_delete_click(&user);
                        self.confirm_delete().await?;
                    }
                    None => writeln!(self.out, "no user with id {}", id)?,
                }
            }
            "help" | "?" => writeln!(self.out, "{}", HELP)?,
            "quit" | "exit" | "q" => return Ok(false),
            other => writeln!(self.out, "unknown command `{}`, try `help`", other)?,
        }
        Ok(true)
    }

    fn parse_id(&mut self, arg: Option<&str>) -> Result<Option<UserId>> {
        match arg.map(str::parse::<UserId>) {
            Some(Ok(id)) => Ok(Some(id)),
            _ => {
                writeln!(self.out, "expected a numeric user id")?;
                Ok(None)
            }
        }
    }

    async fn fill_form(&mut self) -> Result<()> {
        let Some(form) = self.page.form() else {
            return Ok(());
        };
        writeln!(self.out, "{}", form.title())?;

        loop {
            let Some(form) = self.page.form() else {
                return Ok(());
            };
            let (name, phone) = (form.name().to_string(), form.phone().to_string());

            let Some(name) = self.ask("Name", &name).await? else {
                self.page.handle_cancel();
                writeln!(self.out, "cancelled")?;
                return Ok(());
            };
            let Some(phone) = self.ask("Phone", &phone).await? else {
                self.page.handle_cancel();
                writeln!(self.out, "cancelled")?;
                return Ok(());
            };

            if let Some(form) = self.page.form_mut() {
                form.set_name(name);
                form.set_phone(phone);
            }

            match self.page.submit_form() {
                Ok(_) => {
                    writeln!(self.out, "saved; the list updates when the backend confirms")?;
                    return Ok(());
                }
                Err(e) => writeln!(self.out, "{}", e)?,
            }
        }
    }

    async fn confirm_delete(&mut self) -> Result<()> {
        let dialog = self.page.confirm_dialog();
        if let Some(title) = dialog.title() {
            writeln!(self.out, "{}", title)?;
        }
        writeln!(self.out, "{}", dialog.message())?;
        write!(self.out, "[y/N] ")?;
        self.out.flush()?;

        let answer = self.input.next_line().await?.unwrap_or_default();
        if matches!(answer.trim(), "y" | "Y" | "yes") {
            self.page.handle_confirm_delete();
            writeln!(self.out, "deleting")?;
        } else {
            self.page.handle_cancel_delete();
            writeln!(self.out, "kept")?;
        }
        Ok(())
    }

    /// Prompt for a field. `None` means cancel (`.` or end of input).
    async fn ask(&mut self, label: &str, current: &str) -> Result<Option<String>> {
        if current.is_empty() {
            write!(self.out, "{}: ", label)?;
        } else {
            write!(self.out, "{} [{}]: ", label, current)?;
        }
        self.out.flush()?;

        let Some(line) = self.input.next_line().await? else {
            return Ok(None);
        };
        let line = line.trim();
        Ok(match line {
            "." => None,
            "" => Some(current.to_string()),
            value => Some(value.to_string()),
        })
    }
}
