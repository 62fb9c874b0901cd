//! Tag-keyed dispatch of received packs to handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use graphwire_core::{TypeRegistry, TypeTag};

use crate::{Pack, ProtocolError};

type Handler<C> = Box<dyn Fn(&mut C, &dyn Pack) -> bool + Send + Sync>;

/// Routes packs to the handler registered for their concrete type.
///
/// `C` is whatever state the handlers mutate (a lobby, a game). Handlers
/// return whether the pack was applied, which is what
/// [`Connection::acknowledge`](crate::Connection::acknowledge) reports
/// back to the sender.
///
/// ```ignore
/// let mut applier = Applier::<Lobby>::new(registry);
/// applier.on::<ChatMessage>(|lobby, chat| lobby.post(chat))?;
/// ```
pub struct Applier<C> {
    registry: Arc<TypeRegistry>,
    handlers: HashMap<TypeTag, Handler<C>>,
}

impl<C> Applier<C> {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            handlers: HashMap::new(),
        }
    }

    /// Installs the handler for pack type `P`, replacing any previous one.
    ///
    /// Fails if `P` is not registered.
    pub fn on<P: Pack>(
        &mut self,
        handler: impl Fn(&mut C, &P) -> bool + Send + Sync + 'static,
    ) -> Result<&mut Self, ProtocolError>
    where
        C: 'static,
    {
        let tag = self.registry.lookup::<P>()?;
        self.handlers.insert(
            tag,
            Box::new(move |ctx: &mut C, pack: &dyn Pack| {
                match (*pack).as_any().downcast_ref::<P>() {
                    Some(pack) => handler(ctx, pack),
                    None => false,
                }
            }),
        );
        Ok(self)
    }

    /// Runs the handler for `pack`. `None` when no handler is installed
    /// for its type.
    pub fn apply(&self, ctx: &mut C, pack: &dyn Pack) -> Option<bool> {
        let tag = self
            .registry
            .lookup_id((*pack).as_any().type_id(), pack.name())
            .ok()?;
        let Some(handler) = self.handlers.get(&tag) else {
            tracing::debug!(pack = pack.name(), %tag, "no handler for pack");
            return None;
        };
        let applied = handler(ctx, pack);
        tracing::trace!(pack = pack.name(), applied, "applied pack");
        Some(applied)
    }

    pub fn handles(&self, tag: TypeTag) -> bool {
        self.handlers.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C> fmt::Debug for Applier<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.handlers.keys().copied().collect();
        tags.sort();
        f.debug_struct("Applier").field("handlers", &tags).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatMessage, PlayerLeft, QuitMenuWithoutStarting, register_lobby_packs};

    #[derive(Default)]
    struct Lobby {
        log: Vec<String>,
    }

    fn applier() -> Applier<Lobby> {
        let mut registry = TypeRegistry::new();
        register_lobby_packs(&mut registry);
        Applier::new(Arc::new(registry))
    }

    #[test]
    fn test_dispatch_by_type() {
        let mut applier = applier();
        applier
            .on::<ChatMessage>(|lobby, chat| {
                lobby.log.push(chat.message.clone());
                true
            })
            .unwrap()
            .on::<PlayerLeft>(|_, _| false)
            .unwrap();

        let mut lobby = Lobby::default();
        let chat = ChatMessage {
            player_name: "a".into(),
            message: "hello".into(),
        };
        assert_eq!(applier.apply(&mut lobby, &chat), Some(true));
        assert_eq!(applier.apply(&mut lobby, &PlayerLeft::default()), Some(false));
        assert_eq!(applier.apply(&mut lobby, &QuitMenuWithoutStarting), None);
        assert_eq!(lobby.log, vec!["hello".to_string()]);
        assert_eq!(applier.len(), 2);
    }

    #[test]
    fn test_unregistered_pack_rejected() {
        #[derive(Debug)]
        struct Stray;
        impl Pack for Stray {
            fn name(&self) -> &'static str {
                "Stray"
            }
        }

        let mut applier = applier();
        assert!(applier.on::<Stray>(|_, _| true).is_err());
        assert_eq!(applier.apply(&mut Lobby::default(), &Stray), None);
    }
}
