use crate::server::ServerRouter;

mod accounts;
mod announcements;
mod content;
mod market;
mod tickets;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(accounts::routes())
        .merge(announcements::routes())
        .merge(content::routes())
        .merge(market::routes())
        .merge(tickets::routes())
}
