use std::io;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::booking::BookingService;
use crate::compactor;
use crate::config::Config;
use crate::limits::*;
use crate::notify::NotifyHub;
use crate::store::LedgerStore;

/// One venue: its ledger, its change feed and the booking service over both.
pub struct Venue {
    pub name: String,
    pub store: Arc<LedgerStore>,
    pub notify: Arc<NotifyHub>,
    pub bookings: BookingService,
}

/// Lazily opens venues. Each venue gets its own WAL under the data dir and
/// its own compactor task.
pub struct VenueManager {
    venues: DashMap<String, Arc<Venue>>,
    config: Config,
}

impl VenueManager {
    pub fn new(config: Config) -> Self {
        Self {
            venues: DashMap::new(),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.venues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }

    /// Get or lazily open the venue. Names that sanitize to the same file
    /// share one venue.
    pub fn get_or_create(&self, name: &str) -> io::Result<Arc<Venue>> {
        if name.len() > MAX_VENUE_NAME_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "venue name too long"));
        }
        // Path traversal
        let safe_name: String = name
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty venue name"));
        }
        if let Some(venue) = self.venues.get(&safe_name) {
            return Ok(venue.value().clone());
        }
        if self.venues.len() >= MAX_VENUES {
            return Err(io::Error::other("too many venues"));
        }

        // Holding the entry keeps a concurrent caller from opening the same
        // WAL twice.
        let venue = match self.venues.entry(safe_name.clone()) {
            Entry::Occupied(e) => return Ok(e.get().clone()),
            Entry::Vacant(e) => {
                let venue = Arc::new(self.open(safe_name)?);
                e.insert(venue.clone());
                venue
            }
        };
        metrics::gauge!(crate::observability::VENUES_ACTIVE).set(self.venues.len() as f64);
        tracing::info!("opened venue {}", venue.name);
        Ok(venue)
    }

    fn open(&self, safe_name: String) -> io::Result<Venue> {
        std::fs::create_dir_all(&self.config.data_dir)?;
        let wal_path = self.config.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let store = Arc::new(LedgerStore::open(wal_path, notify.clone())?);

        tokio::spawn(compactor::run_compactor(
            Arc::downgrade(&store),
            notify.clone(),
            self.config.compact_threshold,
            self.config.compact_interval,
        ));

        let bookings = BookingService::new(store.clone(), store.clone(), store.clone(), store.clone());
        Ok(Venue {
            name: safe_name,
            store,
            notify,
            bookings,
        })
    }
}
