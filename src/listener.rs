// ============================================================================
// Lifecycle Listeners
// ============================================================================
//
// Application hooks fired by the persister around inserts, updates, reads
// and persist calls. Every method defaults to doing nothing.
//
// ============================================================================

use crate::core::PersistError;

pub trait InsertListener<C> {
    fn before_insert(&self, _entities: &[C]) {}

    fn after_insert(&self, _entities: &[C]) {}

    fn on_insert_error(&self, _entities: &[C], _error: &PersistError) {}
}

pub trait UpdateListener<C> {
    fn before_update(&self, _entities: &[C]) {}

    fn after_update(&self, _entities: &[C]) {}

    fn on_update_error(&self, _entities: &[C], _error: &PersistError) {}
}

pub trait SelectListener<C, I> {
    fn before_select(&self, _ids: &[I]) {}

    fn after_select(&self, _entities: &[C]) {}

    fn on_select_error(&self, _ids: &[I], _error: &PersistError) {}
}

pub trait PersistListener<C> {
    fn before_persist(&self, _entities: &[C]) {}

    fn after_persist(&self, _entities: &[C]) {}
}

/// Listeners registered on one persister, fired in registration order.
pub struct Listeners<C, I> {
    insert: Vec<Box<dyn InsertListener<C>>>,
    update: Vec<Box<dyn UpdateListener<C>>>,
    select: Vec<Box<dyn SelectListener<C, I>>>,
    persist: Vec<Box<dyn PersistListener<C>>>,
}

impl<C, I> Default for Listeners<C, I> {
    fn default() -> Self {
        Self {
            insert: Vec::new(),
            update: Vec::new(),
            select: Vec::new(),
            persist: Vec::new(),
        }
    }
}

impl<C, I> Listeners<C, I> {
    pub fn add_insert(&mut self, listener: Box<dyn InsertListener<C>>) {
        self.insert.push(listener);
    }

    pub fn add_update(&mut self, listener: Box<dyn UpdateListener<C>>) {
        self.update.push(listener);
    }

    pub fn add_select(&mut self, listener: Box<dyn SelectListener<C, I>>) {
        self.select.push(listener);
    }

    pub fn add_persist(&mut self, listener: Box<dyn PersistListener<C>>) {
        self.persist.push(listener);
    }

    pub fn before_insert(&self, entities: &[C]) {
        self.insert.iter().for_each(|l| l.before_insert(entities));
    }

    pub fn after_insert(&self, entities: &[C]) {
        self.insert.iter().for_each(|l| l.after_insert(entities));
    }

    pub fn on_insert_error(&self, entities: &[C], error: &PersistError) {
        self.insert.iter().for_each(|l| l.on_insert_error(entities, error));
    }

    pub fn before_update(&self, entities: &[C]) {
        self.update.iter().for_each(|l| l.before_update(entities));
    }

    pub fn after_update(&self, entities: &[C]) {
        self.update.iter().for_each(|l| l.after_update(entities));
    }

    pub fn on_update_error(&self, entities: &[C], error: &PersistError) {
        self.update.iter().for_each(|l| l.on_update_error(entities, error));
    }

    pub fn before_select(&self, ids: &[I]) {
        self.select.iter().for_each(|l| l.before_select(ids));
    }

    pub fn after_select(&self, entities: &[C]) {
        self.select.iter().for_each(|l| l.after_select(entities));
    }

    pub fn on_select_error(&self, ids: &[I], error: &PersistError) {
        self.select.iter().for_each(|l| l.on_select_error(ids, error));
    }

    pub fn before_persist(&self, entities: &[C]) {
        self.persist.iter().for_each(|l| l.before_persist(entities));
    }

    pub fn after_persist(&self, entities: &[C]) {
        self.persist.iter().for_each(|l| l.after_persist(entities));
    }
}
