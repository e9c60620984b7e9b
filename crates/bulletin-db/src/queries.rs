use std::collections::BTreeSet;

use crate::Database;
use crate::models::{
    InvitationRow, MessageDraft, MessageRow, NewUser, SessionUserRow, UserRow, WebsiteRow,
};
use anyhow::Result;
use bulletin_types::models::Language;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, password_hash, role, email_verified_at, created_at";

const MESSAGE_COLUMNS: &str =
    "id, title, body, kind, language, display_from, display_to, user_id";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<i64> {
        self.with_conn(|conn| insert_user(conn, user))
    }

    /// Inserts the user and deletes any invitation for the same email in one
    /// transaction, so an invitation is consumed exactly once.
    pub fn create_user_from_invitation(&self, user: &NewUser<'_>) -> Result<i64> {
        self.with_tx(|tx| {
            let id = insert_user(tx, user)?;
            tx.execute("DELETE FROM invitations WHERE email = ?1", [user.email])?;
            Ok(id)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
            conn.query_row(&sql, [email], user_from_row).optional()
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
            conn.query_row(&sql, [id], user_from_row).optional()
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn user_exists(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                [email],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn count_users(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?))
    }

    pub fn update_user_names(&self, id: i64, first_name: &str, last_name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET first_name = ?1, last_name = ?2, updated_at = datetime('now')
                 WHERE id = ?3",
                params![first_name, last_name, id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Deletes the user. Their sessions go with them; messages and invitations
    /// they authored are kept with the author reference cleared.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    // -- Sessions --

    pub fn create_session(&self, user_id: i64, token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (user_id, token, expires_at) VALUES (?1, ?2, ?3)",
                params![user_id, token, expires_at.timestamp()],
            )?;
            Ok(())
        })
    }

    /// Looks up a session that has not expired at `now`, joined with its user.
    pub fn find_live_session(&self, token: &str, now: DateTime<Utc>) -> Result<Option<SessionUserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT s.user_id, u.email, u.role
                 FROM sessions s
                 JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1 AND s.expires_at > ?2",
                params![token, now.timestamp()],
                |row| {
                    Ok(SessionUserRow {
                        user_id: row.get(0)?,
                        email: row.get(1)?,
                        role: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn delete_session(&self, token: &str) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?))
    }

    // -- Email verification --

    pub fn create_verification(&self, user_id: i64, token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO email_verifications (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token, user_id, expires_at.timestamp()],
            )?;
            Ok(())
        })
    }

    /// Consumes a verification token and marks its user verified.
    /// Returns the user id, or `None` if the token is unknown or expired.
    pub fn consume_verification(&self, token: &str, now: DateTime<Utc>) -> Result<Option<i64>> {
        self.with_tx(|tx| {
            let user_id: Option<i64> = tx
                .query_row(
                    "SELECT user_id FROM email_verifications WHERE token = ?1 AND expires_at > ?2",
                    params![token, now.timestamp()],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(user_id) = user_id else {
                return Ok(None);
            };

            tx.execute("DELETE FROM email_verifications WHERE user_id = ?1", [user_id])?;
            tx.execute(
                "UPDATE users SET email_verified_at = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![now.timestamp(), user_id],
            )?;
            Ok(Some(user_id))
        })
    }

    // -- Invitations --

    pub fn create_invitation(&self, email: &str, invited_by: i64) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO invitations (email, invited_by) VALUES (?1, ?2)",
                params![email, invited_by],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn invitation_exists(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM invitations WHERE email = ?1)",
                [email],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn list_invitations(&self) -> Result<Vec<InvitationRow>> {
        self.with_conn(|conn| {
            // LEFT JOIN: the inviter may have been deleted since.
            let mut stmt = conn.prepare(
                "SELECT i.id, i.email, i.invited_by, u.first_name || ' ' || u.last_name
                 FROM invitations i
                 LEFT JOIN users u ON u.id = i.invited_by
                 ORDER BY i.id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(InvitationRow {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        invited_by: row.get(2)?,
                        inviter_name: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_invitation(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM invitations WHERE id = ?1", [id])? > 0))
    }

    // -- Websites --

    pub fn create_website(&self, name: &str, url: &str, staging: bool) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO websites (name, url, staging) VALUES (?1, ?2, ?3)",
                params![name, url, staging],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn update_website(&self, id: i64, name: &str, url: &str, staging: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE websites SET name = ?1, url = ?2, staging = ?3, updated_at = datetime('now')
                 WHERE id = ?4",
                params![name, url, staging, id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Deletes the website; its message links are removed by the foreign key cascade.
    pub fn delete_website(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM websites WHERE id = ?1", [id])? > 0))
    }

    pub fn get_website(&self, id: i64) -> Result<Option<WebsiteRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, url, staging FROM websites WHERE id = ?1",
                [id],
                website_from_row,
            )
            .optional()
        })
    }

    pub fn get_website_by_url(&self, url: &str) -> Result<Option<WebsiteRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, url, staging FROM websites WHERE url = ?1",
                [url],
                website_from_row,
            )
            .optional()
        })
    }

    pub fn list_websites(&self) -> Result<Vec<WebsiteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, url, staging FROM websites ORDER BY id")?;
            let rows = stmt
                .query_map([], website_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Whether another website (other than `except_id`) already uses `url`.
    pub fn website_url_taken(&self, url: &str, except_id: Option<i64>) -> Result<bool> {
        self.with_conn(|conn| {
            let taken = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM websites WHERE url = ?1 AND id != ?2)",
                params![url, except_id.unwrap_or(0)],
                |row| row.get(0),
            )?;
            Ok(taken)
        })
    }

    /// Returns the subset of `ids` that refer to existing websites.
    pub fn existing_website_ids(&self, ids: &[i64]) -> Result<BTreeSet<i64>> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id FROM websites WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

            let found = stmt
                .query_map(params.as_slice(), |row| row.get::<_, i64>(0))?
                .collect::<std::result::Result<BTreeSet<_>, _>>()?;
            Ok(found)
        })
    }

    // -- Messages --

    /// Inserts the message and links it to `website_ids` in one transaction.
    pub fn create_message(&self, author_id: i64, draft: &MessageDraft, website_ids: &[i64]) -> Result<i64> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO messages (title, body, kind, language, display_from, display_to, user_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    draft.title,
                    draft.body,
                    draft.kind.as_str(),
                    draft.language.as_str(),
                    draft.display_from.timestamp(),
                    draft.display_to.timestamp(),
                    author_id,
                ],
            )?;
            let id = tx.last_insert_rowid();
            replace_website_links(tx, id, website_ids)?;
            Ok(id)
        })
    }

    /// Updates every mutable field and replaces the website links in one
    /// transaction. Returns `false` (and changes nothing) if the message is gone.
    pub fn update_message(&self, id: i64, draft: &MessageDraft, website_ids: &[i64]) -> Result<bool> {
        self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE messages
                 SET title = ?1, body = ?2, kind = ?3, language = ?4,
                     display_from = ?5, display_to = ?6, updated_at = datetime('now')
                 WHERE id = ?7",
                params![
                    draft.title,
                    draft.body,
                    draft.kind.as_str(),
                    draft.language.as_str(),
                    draft.display_from.timestamp(),
                    draft.display_to.timestamp(),
                    id,
                ],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            replace_website_links(tx, id, website_ids)?;
            Ok(true)
        })
    }

    /// Deletes the message and its website links in one transaction.
    pub fn delete_message(&self, id: i64) -> Result<bool> {
        self.with_tx(|tx| {
            tx.execute("DELETE FROM website_messages WHERE message_id = ?1", [id])?;
            let deleted = tx.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
            conn.query_row(&sql, [id], message_from_row).optional()
        })
    }

    /// All messages, most recent display window first.
    pub fn list_messages(&self) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages ORDER BY display_from DESC, id DESC",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn website_ids_for_message(&self, message_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT website_id FROM website_messages WHERE message_id = ?1 ORDER BY website_id",
            )?;
            let ids = stmt
                .query_map([message_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Messages linked to `website_id` in `language` that have not expired at
    /// `now`. Unless `include_scheduled`, messages whose window has not opened
    /// yet are left out too.
    pub fn visible_messages(
        &self,
        website_id: i64,
        language: Language,
        now: DateTime<Utc>,
        include_scheduled: bool,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE id IN (SELECT message_id FROM website_messages WHERE website_id = ?1)
                   AND language = ?2
                   AND display_to > ?3
                   AND (?4 OR display_from < ?3)
                 ORDER BY display_from, id",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![website_id, language.as_str(), now.timestamp(), include_scheduled],
                    message_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn insert_user(conn: &Connection, user: &NewUser<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (email, first_name, last_name, password_hash, role)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.email,
            user.first_name,
            user.last_name,
            user.password_hash,
            user.role.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Delete-all then insert; callers run this inside the message transaction.
fn replace_website_links(conn: &Connection, message_id: i64, website_ids: &[i64]) -> Result<()> {
    conn.execute("DELETE FROM website_messages WHERE message_id = ?1", [message_id])?;

    let unique: BTreeSet<i64> = website_ids.iter().copied().collect();
    let mut stmt =
        conn.prepare("INSERT INTO website_messages (website_id, message_id) VALUES (?1, ?2)")?;
    for website_id in unique {
        stmt.execute([website_id, message_id])?;
    }
    Ok(())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        password_hash: row.get(4)?,
        role: row.get(5)?,
        email_verified_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn website_from_row(row: &Row<'_>) -> rusqlite::Result<WebsiteRow> {
    Ok(WebsiteRow {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        staging: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        kind: row.get(3)?,
        language: row.get(4)?,
        display_from: row.get(5)?,
        display_to: row.get(6)?,
        user_id: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
