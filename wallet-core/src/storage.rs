//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account records (key: account_id)
//! - `entries` - Append-only ledger entries (key: account_id || seq_be)
//! - `indices` - Secondary indices (idempotency key, entry id, owner)
//! - `stats` - Per-owner rollup buckets
//! - `counters` - Day-bucketed posted/rejected operation counters
//!
//! The `entries` key layout clusters an account's entries contiguously in
//! sequence order, so history reads and balance replays are a single
//! range scan. A posting commits the account update, the entry, its
//! indices, and the stats rows in one `WriteBatch`: either everything is
//! durable or nothing is.

use crate::{
    error::{Error, Result},
    stats::StatBucket,
    types::{Account, AccountId, LedgerEntry, OwnerId},
    Config,
};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_ENTRIES: &str = "entries";
const CF_INDICES: &str = "indices";
const CF_STATS: &str = "stats";
const CF_COUNTERS: &str = "counters";

/// Index key prefixes within `indices`
const IDX_IDEMPOTENCY: u8 = b'k';
const IDX_ENTRY_ID: u8 = b'e';
const IDX_OWNER: u8 = b'o';

/// Which operation counter to touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// Operations that committed
    Posted,
    /// Business-rule rejections (no ledger row exists for these)
    Rejected,
}

impl CounterKind {
    fn prefix(&self) -> u8 {
        match self {
            CounterKind::Posted => b'p',
            CounterKind::Rejected => b'r',
        }
    }
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    // Serializes read-modify-write on the counters column family; the
    // account locks do not cover cross-account counter updates.
    counter_mu: Mutex<()>,
}

impl Storage {
    /// Open or create the database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            config.rocksdb.level0_file_num_compaction_trigger,
        );

        // Universal compaction for the append-heavy entries workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_accounts()),
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_entries()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_STATS, Self::cf_options_stats()),
            ColumnFamilyDescriptor::new(CF_COUNTERS, Self::cf_options_counters()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "Opened RocksDB");

        Ok(Self {
            db: Arc::new(db),
            counter_mu: Mutex::new(()),
        })
    }

    // Column family options

    fn cf_options_accounts() -> Options {
        let mut opts = Options::default();
        // Hot read path, favor speed over ratio
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_entries() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_stats() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_counters() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Key helpers

    fn entry_key(account_id: AccountId, sequence: u64) -> [u8; 24] {
        let mut key = [0u8; 24];
        key[..16].copy_from_slice(account_id.as_bytes());
        key[16..].copy_from_slice(&sequence.to_be_bytes());
        key
    }

    fn index_key(prefix: u8, id: &Uuid) -> [u8; 17] {
        let mut key = [0u8; 17];
        key[0] = prefix;
        key[1..].copy_from_slice(id.as_bytes());
        key
    }

    fn owner_index_key(owner: OwnerId, account: AccountId) -> [u8; 33] {
        let mut key = [0u8; 33];
        key[0] = IDX_OWNER;
        key[1..17].copy_from_slice(owner.as_bytes());
        key[17..].copy_from_slice(account.as_bytes());
        key
    }

    fn counter_key(kind: CounterKind, day: NaiveDate) -> Vec<u8> {
        let mut key = vec![kind.prefix()];
        key.extend_from_slice(day.format("%Y-%m-%d").to_string().as_bytes());
        key
    }

    // Account operations

    /// Create a new account together with its owner index row.
    pub fn create_account(&self, account: &Account) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        batch.put_cf(cf_accounts, account.id.as_bytes(), bincode::serialize(account)?);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::owner_index_key(account.owner_id, account.id),
            [],
        );

        self.db.write(batch)?;

        tracing::info!(
            account_id = %account.id,
            owner_id = %account.owner_id,
            kind = ?account.kind,
            "Account created"
        );

        Ok(())
    }

    /// Overwrite an account record (status transitions).
    pub fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        self.db
            .put_cf(cf, account.id.as_bytes(), bincode::serialize(account)?)?;
        Ok(())
    }

    /// Get an account by ID.
    pub fn get_account(&self, id: AccountId) -> Result<Account> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = self
            .db
            .get_cf(cf, id.as_bytes())?
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))?;
        let account: Account = bincode::deserialize(&value)?;
        Ok(account)
    }

    /// All accounts belonging to an owner, via the owner index.
    pub fn accounts_for_owner(&self, owner: OwnerId) -> Result<Vec<Account>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut prefix = vec![IDX_OWNER];
        prefix.extend_from_slice(owner.as_bytes());

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, Direction::Forward));

        let mut accounts = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if key.len() == 33 {
                let account_bytes: [u8; 16] = key[17..33]
                    .try_into()
                    .map_err(|_| Error::Storage("malformed owner index key".to_string()))?;
                let account_id = AccountId::new(Uuid::from_bytes(account_bytes));
                accounts.push(self.get_account(account_id)?);
            }
        }

        Ok(accounts)
    }

    // Entry operations

    /// Get an entry by its ID, via the entry-id index.
    pub fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let idx_key = Self::index_key(IDX_ENTRY_ID, &entry_id);

        let entry_key = self
            .db
            .get_cf(cf_indices, idx_key)?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;

        self.get_entry_at(&entry_key)
            .and_then(|e| e.ok_or_else(|| Error::EntryNotFound(entry_id.to_string())))
    }

    fn get_entry_at(&self, entry_key: &[u8]) -> Result<Option<LedgerEntry>> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        match self.db.get_cf(cf, entry_key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Entries for one account in sequence order, starting after
    /// `from_seq`, at most `limit` entries. `limit == 0` means no limit.
    pub fn entries_for_account(
        &self,
        account_id: AccountId,
        from_seq: u64,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let start = Self::entry_key(account_id, from_seq.saturating_add(1));

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(account_id.as_bytes()) {
                break;
            }
            entries.push(bincode::deserialize::<LedgerEntry>(&value)?);
            if limit > 0 && entries.len() >= limit {
                break;
            }
        }

        Ok(entries)
    }

    /// Find the committed entry for an idempotency key, if any.
    pub fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<LedgerEntry>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let idx_key = Self::index_key(IDX_IDEMPOTENCY, &key);

        match self.db.get_cf(cf_indices, idx_key)? {
            Some(entry_key) => self.get_entry_at(&entry_key),
            None => Ok(None),
        }
    }

    /// Scan every ledger entry. The read path never locks accounts;
    /// reporting runs over this scan without blocking writers.
    pub fn all_entries(&self) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);

        let mut entries = Vec::new();
        for item in iter {
            let (_, value) = item?;
            entries.push(bincode::deserialize::<LedgerEntry>(&value)?);
        }
        Ok(entries)
    }

    /// Entries with `created_at` inside the inclusive range.
    pub fn entries_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .all_entries()?
            .into_iter()
            .filter(|e| e.created_at >= start && e.created_at <= end)
            .collect())
    }

    // Posting commit

    /// Commit a posting atomically: updated account records, new ledger
    /// entries (with their idempotency and entry-id index rows), and
    /// stats buckets, in a single WriteBatch.
    pub fn commit_posting(
        &self,
        accounts: &[&Account],
        entries: &[&LedgerEntry],
        stat_rows: &[(Vec<u8>, StatBucket)],
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        for account in accounts {
            batch.put_cf(
                cf_accounts,
                account.id.as_bytes(),
                bincode::serialize(*account)?,
            );
        }

        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;
        for entry in entries {
            let entry_key = Self::entry_key(entry.account_id, entry.sequence_number);
            batch.put_cf(cf_entries, entry_key, bincode::serialize(*entry)?);
            batch.put_cf(
                cf_indices,
                Self::index_key(IDX_IDEMPOTENCY, &entry.idempotency_key),
                entry_key,
            );
            batch.put_cf(cf_indices, Self::index_key(IDX_ENTRY_ID, &entry.id), entry_key);
        }

        let cf_stats = self.cf_handle(CF_STATS)?;
        for (key, bucket) in stat_rows {
            batch.put_cf(cf_stats, key, bincode::serialize(bucket)?);
        }

        self.db.write(batch)?;

        for entry in entries {
            tracing::debug!(
                entry_id = %entry.id,
                account_id = %entry.account_id,
                sequence = entry.sequence_number,
                direction = %entry.direction,
                amount = %entry.amount,
                "Entry posted"
            );
        }

        Ok(())
    }

    // Stats operations

    /// Read one stats bucket.
    pub fn get_stat(&self, key: &[u8]) -> Result<Option<StatBucket>> {
        let cf = self.cf_handle(CF_STATS)?;
        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Write stats buckets outside a posting (registrations).
    pub fn put_stats(&self, rows: &[(Vec<u8>, StatBucket)]) -> Result<()> {
        let cf = self.cf_handle(CF_STATS)?;
        let mut batch = WriteBatch::default();
        for (key, bucket) in rows {
            batch.put_cf(cf, key, bincode::serialize(bucket)?);
        }
        self.db.write(batch)?;
        Ok(())
    }

    // Operation counters (observability; not part of the audit trail)

    /// Increment the day's counter and return the new value.
    pub fn bump_counter(&self, kind: CounterKind, day: NaiveDate) -> Result<u64> {
        let cf = self.cf_handle(CF_COUNTERS)?;
        let key = Self::counter_key(kind, day);

        let _guard = self.counter_mu.lock();
        let current = match self.db.get_cf(cf, &key)? {
            Some(value) => bincode::deserialize::<u64>(&value)?,
            None => 0,
        };
        let next = current + 1;
        self.db.put_cf(cf, &key, bincode::serialize(&next)?)?;
        Ok(next)
    }

    /// Read one day's counter.
    pub fn read_counter(&self, kind: CounterKind, day: NaiveDate) -> Result<u64> {
        let cf = self.cf_handle(CF_COUNTERS)?;
        let key = Self::counter_key(kind, day);
        match self.db.get_cf(cf, &key)? {
            Some(value) => Ok(bincode::deserialize(&value)?),
            None => Ok(0),
        }
    }

    /// Sum (posted, rejected) counters over an inclusive day range.
    pub fn counters_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<(u64, u64)> {
        let mut posted = 0u64;
        let mut rejected = 0u64;
        let mut day = start;
        while day <= end {
            posted += self.read_counter(CounterKind::Posted, day)?;
            rejected += self.read_counter(CounterKind::Rejected, day)?;
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        Ok((posted, rejected))
    }
}
