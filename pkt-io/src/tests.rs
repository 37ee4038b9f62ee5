// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#[cfg(test)]
mod test {
    use crate::{PacketBuffer, PacketQueue};
    use std::thread;
    use tracing_test::traced_test;

    // a buffer that identifies the producer, the batch and the position within the batch
    fn tagged(producer: u8, batch: u16, pos: u16) -> PacketBuffer {
        let mut data = vec![producer];
        data.extend_from_slice(&batch.to_be_bytes());
        data.extend_from_slice(&pos.to_be_bytes());
        PacketBuffer::from(data)
    }

    fn untag(buf: &PacketBuffer) -> (u8, u16, u16) {
        let d = buf.as_slice();
        (
            d[0],
            u16::from_be_bytes([d[1], d[2]]),
            u16::from_be_bytes([d[3], d[4]]),
        )
    }

    #[test]
    fn fifo_no_loss_single_threaded() {
        // batches of frames pushed, then popped with a varying burst size until empty
        bolero::check!()
            .with_type::<(Vec<Vec<Vec<u8>>>, u8)>()
            .for_each(|(batches, burst)| {
                let queue = PacketQueue::new();
                let mut pushed = Vec::new();
                for batch in batches {
                    let batch: Vec<_> = batch.iter().map(|f| PacketBuffer::copy_from(f)).collect();
                    pushed.extend(batch.iter().cloned());
                    queue.push_batch(batch);
                }
                let burst = usize::from(*burst).max(1);
                let mut popped = Vec::new();
                loop {
                    let got = queue.pop_front_burst(burst);
                    assert!(got.len() <= burst);
                    if got.is_empty() {
                        break;
                    }
                    popped.extend(got);
                }
                assert_eq!(popped, pushed);
                assert!(queue.is_empty());
            });
    }

    #[test]
    #[traced_test]
    fn concurrent_batches_stay_contiguous() {
        /*
         *   producer 0 ─┐
         *   producer 1 ─┼──► bus ──► single consumer
         *   producer 2 ─┘
         *
         * Every batch must come out contiguous and in push order with respect to the
         * other batches of the same producer. Nothing is lost or duplicated.
         */
        const PRODUCERS: u8 = 3;
        const BATCHES: u16 = 200;
        const BATCH_LEN: u16 = 7;

        let queue = PacketQueue::new();
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = queue.clone();
                thread::Builder::new()
                    .name(format!("producer-{p}"))
                    .spawn(move || {
                        for b in 0..BATCHES {
                            queue.push_batch((0..BATCH_LEN).map(|pos| tagged(p, b, pos)));
                        }
                    })
                    .unwrap()
            })
            .collect();

        let total = usize::from(PRODUCERS) * usize::from(BATCHES) * usize::from(BATCH_LEN);
        let mut popped = Vec::with_capacity(total);
        while popped.len() < total {
            popped.extend(queue.pop_front_burst(64).iter().map(untag));
        }
        for handle in producers {
            handle.join().unwrap();
        }
        assert!(queue.is_empty());

        // batches are never split
        for chunk in popped.chunks(usize::from(BATCH_LEN)) {
            let (p, b, _) = chunk[0];
            for (i, item) in chunk.iter().enumerate() {
                assert_eq!(*item, (p, b, u16::try_from(i).unwrap()));
            }
        }
        // per producer, batches come out in push order
        for p in 0..PRODUCERS {
            let order: Vec<u16> = popped
                .iter()
                .filter(|(prod, _, pos)| *prod == p && *pos == 0)
                .map(|(_, b, _)| *b)
                .collect();
            assert_eq!(order, (0..BATCHES).collect::<Vec<_>>());
        }
    }
}
